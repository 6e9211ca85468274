use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CodecError, Result};

/// Tag of [`Protocol::CompactBinary`] ("BC").
pub const COMPACT_BINARY_TAG: u16 = 0x4243;
/// Tag of [`Protocol::FastBinary`] ("MF").
pub const FAST_BINARY_TAG: u16 = 0x464D;
/// Tag of [`Protocol::SimpleBinary`] ("SP").
pub const SIMPLE_BINARY_TAG: u16 = 0x5053;

/// Binary wire protocols a serializer can speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Variable-length integers, little endian.
    #[default]
    CompactBinary,
    /// Fixed-width integers, little endian.
    FastBinary,
    /// Fixed-width integers, big endian.
    SimpleBinary,
}

impl Protocol {
    /// All supported protocols.
    pub const ALL: [Protocol; 3] = [
        Protocol::CompactBinary,
        Protocol::FastBinary,
        Protocol::SimpleBinary,
    ];

    /// Tag written into marshaled headers.
    pub fn tag(self) -> u16 {
        match self {
            Self::CompactBinary => COMPACT_BINARY_TAG,
            Self::FastBinary => FAST_BINARY_TAG,
            Self::SimpleBinary => SIMPLE_BINARY_TAG,
        }
    }

    /// Resolve a protocol tag.
    pub fn from_tag(tag: u16) -> Result<Self> {
        match tag {
            COMPACT_BINARY_TAG => Ok(Self::CompactBinary),
            FAST_BINARY_TAG => Ok(Self::FastBinary),
            SIMPLE_BINARY_TAG => Ok(Self::SimpleBinary),
            _ => Err(CodecError::UnknownProtocol { tag }),
        }
    }

    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::CompactBinary => "compact_binary",
            Self::FastBinary => "fast_binary",
            Self::SimpleBinary => "simple_binary",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Self::CompactBinary => 0,
            Self::FastBinary => 1,
            Self::SimpleBinary => 2,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Protocol {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "compact" | "compact_binary" | "compactbinary" => Ok(Self::CompactBinary),
            "fast" | "fast_binary" | "fastbinary" => Ok(Self::FastBinary),
            "simple" | "simple_binary" | "simplebinary" => Ok(Self::SimpleBinary),
            _ => Err(CodecError::UnknownProtocolName(s.to_string())),
        }
    }
}

impl Serialize for Protocol {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Protocol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ProtocolVisitor)
    }
}

struct ProtocolVisitor;

impl Visitor<'_> for ProtocolVisitor {
    type Value = Protocol;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a protocol name or numeric protocol tag")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Protocol, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Protocol, E> {
        let tag = u16::try_from(v).map_err(|_| E::custom(format!("protocol tag {v} out of range")))?;
        Protocol::from_tag(tag).map_err(E::custom)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Protocol, E> {
        let v = u64::try_from(v).map_err(|_| E::custom(format!("protocol tag {v} out of range")))?;
        self.visit_u64(v)
    }
}
