use std::io::{self, Read, Write};

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CodecError, Result};
use crate::protocol::Protocol;

/// Size of the marshal header: protocol tag (2) + version (2).
pub const MARSHAL_HEADER_SIZE: usize = 4;

/// Marshal header version written and accepted by this codec.
pub const MARSHAL_VERSION: u16 = 1;

/// Every (protocol, marshal) combination, indexed by
/// `protocol.index() * 2 + marshaled as usize`.
const STRATEGIES: [Strategy; 6] = [
    Strategy::new(Protocol::CompactBinary, false),
    Strategy::new(Protocol::CompactBinary, true),
    Strategy::new(Protocol::FastBinary, false),
    Strategy::new(Protocol::FastBinary, true),
    Strategy::new(Protocol::SimpleBinary, false),
    Strategy::new(Protocol::SimpleBinary, true),
];

/// A stateless serialize/deserialize pair for one protocol and marshal mode.
///
/// Marshaled strategies prefix every payload with a header naming the
/// protocol, so a marshaled reader decodes whatever protocol the writer used.
/// Unmarshaled payloads carry no header and must be read with the protocol
/// they were written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Strategy {
    protocol: Protocol,
    marshaled: bool,
}

impl Strategy {
    const fn new(protocol: Protocol, marshaled: bool) -> Self {
        Self {
            protocol,
            marshaled,
        }
    }

    /// Select the strategy for `protocol` and `marshal`.
    pub fn create(protocol: Protocol, marshal: bool) -> Self {
        STRATEGIES[protocol.index() * 2 + usize::from(marshal)]
    }

    /// Select the strategy for a numeric protocol tag.
    pub fn create_from_tag(tag: u16, marshal: bool) -> Result<Self> {
        Protocol::from_tag(tag).map(|protocol| Self::create(protocol, marshal))
    }

    /// All six strategies.
    pub fn all() -> impl Iterator<Item = Strategy> {
        STRATEGIES.into_iter()
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn is_marshaled(&self) -> bool {
        self.marshaled
    }

    /// Write `value` to `writer`.
    pub fn serialize<W: Write, T: Serialize + ?Sized>(&self, mut writer: W, value: &T) -> Result<()> {
        if self.marshaled {
            let mut header = [0u8; MARSHAL_HEADER_SIZE];
            header[..2].copy_from_slice(&self.protocol.tag().to_le_bytes());
            header[2..].copy_from_slice(&MARSHAL_VERSION.to_le_bytes());
            writer
                .write_all(&header)
                .map_err(|err| CodecError::Encode(Box::new(bincode::ErrorKind::Io(err))))?;
        }
        encode(self.protocol, writer, value).map_err(CodecError::Encode)
    }

    /// Read one value from `reader`, consuming at most `limit` bytes.
    pub fn deserialize<R: Read, T: DeserializeOwned>(&self, reader: R, limit: u64) -> Result<T> {
        let mut reader = CountingReader {
            inner: reader,
            count: 0,
        };

        let protocol = if self.marshaled {
            read_header(&mut reader)?
        } else {
            self.protocol
        };

        let remaining = limit.saturating_sub(reader.count);
        decode(protocol, &mut reader, remaining).map_err(|source| CodecError::Decode {
            offset: reader.count,
            source,
        })
    }
}

fn read_header<R: Read>(reader: &mut CountingReader<R>) -> Result<Protocol> {
    let mut header = [0u8; MARSHAL_HEADER_SIZE];
    reader
        .read_exact(&mut header)
        .map_err(|_| CodecError::TruncatedHeader {
            offset: reader.count,
        })?;

    let tag = u16::from_le_bytes([header[0], header[1]]);
    let version = u16::from_le_bytes([header[2], header[3]]);
    let protocol = Protocol::from_tag(tag).map_err(|_| CodecError::UnknownPayloadProtocol {
        tag,
        offset: reader.count - MARSHAL_HEADER_SIZE as u64,
    })?;
    if version != MARSHAL_VERSION {
        return Err(CodecError::UnsupportedVersion { version });
    }
    Ok(protocol)
}

fn encode<W: Write, T: Serialize + ?Sized>(
    protocol: Protocol,
    writer: W,
    value: &T,
) -> bincode::Result<()> {
    let options = bincode::DefaultOptions::new();
    match protocol {
        Protocol::CompactBinary => options
            .with_varint_encoding()
            .with_little_endian()
            .serialize_into(writer, value),
        Protocol::FastBinary => options
            .with_fixint_encoding()
            .with_little_endian()
            .serialize_into(writer, value),
        Protocol::SimpleBinary => options
            .with_fixint_encoding()
            .with_big_endian()
            .serialize_into(writer, value),
    }
}

fn decode<R: Read, T: DeserializeOwned>(
    protocol: Protocol,
    reader: R,
    limit: u64,
) -> bincode::Result<T> {
    let options = bincode::DefaultOptions::new().with_limit(limit);
    match protocol {
        Protocol::CompactBinary => options
            .with_varint_encoding()
            .with_little_endian()
            .deserialize_from(reader),
        Protocol::FastBinary => options
            .with_fixint_encoding()
            .with_little_endian()
            .deserialize_from(reader),
        Protocol::SimpleBinary => options
            .with_fixint_encoding()
            .with_big_endian()
            .deserialize_from(reader),
    }
}

struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}
