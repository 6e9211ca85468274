use std::fmt;
use std::ops::{Deref, Range};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::memory::SharedMemory;
use crate::pool::PoolCounters;

/// Ownership record of one block carved out of a segment.
///
/// Dropped when the last [`ConstBlob`] referencing the block goes away; the
/// bytes are then returned to the segment and the pool accounting is updated.
pub(crate) struct Lease {
    memory: Arc<SharedMemory>,
    bytes: Bytes,
    counters: Arc<PoolCounters>,
}

impl Lease {
    pub(crate) fn new(memory: Arc<SharedMemory>, bytes: Bytes, counters: Arc<PoolCounters>) -> Self {
        Self {
            memory,
            bytes,
            counters,
        }
    }

    pub(crate) fn bytes(&self) -> &Bytes {
        &self.bytes
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.bytes.is_empty() {
            self.memory.unregister(self.bytes.as_ptr() as usize);
        }
        self.memory.unreserve(self.bytes.len());
        self.counters.release(self.bytes.len());
    }
}

/// An immutable, reference-counted byte range.
///
/// A leased blob lives in a [`SharedMemory`] segment and keeps its block
/// allocated for as long as any clone exists. A detached blob is ordinary
/// heap memory that belongs to no segment.
#[derive(Clone)]
pub struct ConstBlob {
    bytes: Bytes,
    lease: Option<Arc<Lease>>,
}

impl ConstBlob {
    /// Wrap heap bytes that belong to no segment.
    pub fn detached(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
            lease: None,
        }
    }

    pub(crate) fn leased(bytes: Bytes, lease: Arc<Lease>) -> Self {
        Self {
            bytes,
            lease: Some(lease),
        }
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Identifier of the owning segment, or `None` for detached blobs.
    pub fn memory_id(&self) -> Option<u64> {
        self.lease.as_ref().map(|lease| lease.memory.id())
    }

    /// Returns true if this blob is leased from `memory`.
    pub fn is_in(&self, memory: &SharedMemory) -> bool {
        self.memory_id() == Some(memory.id())
    }

    /// Returns true if this blob belongs to no segment.
    pub fn is_detached(&self) -> bool {
        self.lease.is_none()
    }

    /// A sub-range sharing the same lease.
    ///
    /// # Panics
    ///
    /// Panics if `range` is out of bounds, like slice indexing.
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            bytes: self.bytes.slice(range),
            lease: self.lease.clone(),
        }
    }
}

impl Deref for ConstBlob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for ConstBlob {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for ConstBlob {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for ConstBlob {}

impl fmt::Debug for ConstBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstBlob")
            .field("len", &self.bytes.len())
            .field("memory_id", &self.memory_id())
            .finish()
    }
}

/// An ordered list of const blobs whose concatenation forms one payload.
///
/// Dropping the buffer releases its reference on every blob; blocks return
/// to their segment once no other buffer or blob refers to them.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConstBuffer {
    blobs: Vec<ConstBlob>,
    len: usize,
}

impl ConstBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a buffer from blobs, skipping empty ones.
    pub fn from_blobs(blobs: impl IntoIterator<Item = ConstBlob>) -> Self {
        blobs.into_iter().collect()
    }

    /// Append a blob. Empty blobs are ignored.
    pub fn push(&mut self, blob: ConstBlob) {
        if !blob.is_empty() {
            self.len += blob.len();
            self.blobs.push(blob);
        }
    }

    /// Total payload length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The blobs making up the payload, in order.
    pub fn blobs(&self) -> &[ConstBlob] {
        &self.blobs
    }

    /// Contiguous copy of the payload. Single-blob buffers are returned without copying.
    pub fn to_bytes(&self) -> Bytes {
        match self.blobs.as_slice() {
            [] => Bytes::new(),
            [single] => single.as_bytes().clone(),
            blobs => {
                let mut out = BytesMut::with_capacity(self.len);
                for blob in blobs {
                    out.extend_from_slice(blob);
                }
                out.freeze()
            }
        }
    }
}

impl From<ConstBlob> for ConstBuffer {
    fn from(blob: ConstBlob) -> Self {
        let mut buffer = Self::new();
        buffer.push(blob);
        buffer
    }
}

impl FromIterator<ConstBlob> for ConstBuffer {
    fn from_iter<I: IntoIterator<Item = ConstBlob>>(iter: I) -> Self {
        let mut buffer = Self::new();
        for blob in iter {
            buffer.push(blob);
        }
        buffer
    }
}

impl fmt::Debug for ConstBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstBuffer")
            .field("len", &self.len)
            .field("blobs", &self.blobs.len())
            .finish()
    }
}
