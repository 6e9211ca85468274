use std::fmt;
use std::ops::Deref;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use shmrpc_memory::ConstBlob;

use crate::stream;

/// A byte-string field backed by a [`ConstBlob`].
///
/// When the blob lives in a serializer's output memory and is at least
/// `min_blob_size` long, serializing it appends a reference to the blob
/// instead of copying its bytes. On the read side a blob whose bytes lie
/// within one blob of the input buffer is a view sharing that blob's lease;
/// bytes spanning several blobs are copied.
#[derive(Clone, PartialEq, Eq)]
pub struct Blob(ConstBlob);

impl Blob {
    pub fn new(blob: ConstBlob) -> Self {
        Self(blob)
    }

    pub fn as_const_blob(&self) -> &ConstBlob {
        &self.0
    }

    pub fn into_inner(self) -> ConstBlob {
        self.0
    }
}

impl Default for Blob {
    fn default() -> Self {
        Self(ConstBlob::detached(Vec::new()))
    }
}

impl From<ConstBlob> for Blob {
    fn from(blob: ConstBlob) -> Self {
        Self(blob)
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(ConstBlob::detached(bytes))
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Blob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}

impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_byte_buf(BlobVisitor)
    }
}

struct BlobVisitor;

impl<'de> Visitor<'de> for BlobVisitor {
    type Value = Blob;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a byte string")
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Blob, E> {
        Ok(resolve(v).unwrap_or_else(|| Blob::from(v.to_vec())))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Blob, E> {
        Ok(match resolve(&v) {
            Some(view) => view,
            None => Blob::from(v),
        })
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Blob, A::Error> {
        let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(byte) = seq.next_element::<u8>()? {
            bytes.push(byte);
        }
        Ok(Blob::from(bytes))
    }
}

/// The input view holding `bytes`, when they were just read from an active
/// input stream.
fn resolve(bytes: &[u8]) -> Option<Blob> {
    stream::view_of_last_read(bytes.len())
        .filter(|view| view[..] == *bytes)
        .map(Blob)
}
