use shmrpc_memory::MemoryError;

/// Errors that can occur while choosing a protocol or (de)serializing values.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The protocol tag does not name a supported protocol.
    #[error("unknown protocol tag 0x{tag:04x}")]
    UnknownProtocol { tag: u16 },

    /// The protocol name does not name a supported protocol.
    #[error("unknown protocol name '{0}'")]
    UnknownProtocolName(String),

    /// A marshaled payload names a protocol this codec does not know.
    #[error("payload header at offset {offset} names unknown protocol tag 0x{tag:04x}")]
    UnknownPayloadProtocol { tag: u16, offset: u64 },

    /// A marshaled payload carries a header version this codec cannot read.
    #[error("unsupported marshal header version {version}")]
    UnsupportedVersion { version: u16 },

    /// Encoding a value failed.
    #[error("encode failed: {0}")]
    Encode(#[source] bincode::Error),

    /// Decoding a value failed.
    #[error("decode failed at offset {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: bincode::Error,
    },

    /// A marshaled payload ended inside its header.
    #[error("marshal header truncated at offset {offset}")]
    TruncatedHeader { offset: u64 },

    /// An input buffer references memory other than the bound input segment.
    #[error("blob {index} of input buffer belongs to a foreign memory segment")]
    ForeignBlob { index: usize },

    /// Buffer allocation failed.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),
}

impl CodecError {
    /// Returns true if the error describes malformed input rather than a
    /// configuration or allocation problem.
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. }
                | Self::TruncatedHeader { .. }
                | Self::UnknownPayloadProtocol { .. }
                | Self::UnsupportedVersion { .. }
                | Self::ForeignBlob { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
