use std::time::Duration;

use shmrpc_codec::CodecError;
use shmrpc_transport::TransportError;

/// Errors that can occur in typed peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// The configuration is invalid. Raised before any transport exists.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A value could not be serialized or a payload could not be decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The call did not complete within its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Raw transport failure.
    #[error("transport error: {0}")]
    Transport(#[source] TransportError),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,
}

impl From<TransportError> for PeerError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(limit) => PeerError::Timeout(limit),
            TransportError::Closed => PeerError::Closed,
            other => PeerError::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, PeerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_timeout_and_close_keep_their_kind() {
        let limit = Duration::from_millis(5);
        assert!(matches!(
            PeerError::from(TransportError::Timeout(limit)),
            PeerError::Timeout(l) if l == limit
        ));
        assert!(matches!(
            PeerError::from(TransportError::Closed),
            PeerError::Closed
        ));
        assert!(matches!(
            PeerError::from(TransportError::NotFound("svc".into())),
            PeerError::Transport(TransportError::NotFound(_))
        ));
    }
}
