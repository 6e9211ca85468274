use std::fmt;
use std::time::Duration;

use shmrpc_memory::MemoryError;

/// Error returned by a request handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Another live acceptor is bound to the endpoint name.
    #[error("endpoint '{name}' is already bound")]
    AddressInUse { name: String },

    /// No acceptor is bound to the endpoint name.
    #[error("no endpoint named '{0}'")]
    NotFound(String),

    /// The connection handshake failed.
    #[error("failed to connect to '{name}': {reason}")]
    Connect { name: String, reason: String },

    /// The operation did not complete in time.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The connection is closed.
    #[error("connection closed")]
    Closed,

    /// A request handler failed while serving a call.
    #[error("handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// The remote end failed the call; the message is the remote error text.
    #[error("remote call failed ({kind}): {message}")]
    Remote {
        kind: RemoteErrorKind,
        message: String,
    },

    /// Shared memory could not be created or allocated.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// The owning acceptor or accessor has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Why the remote end failed a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The request could not be decoded.
    MalformedRequest,
    /// The handler ran and returned an error.
    Handler,
}

impl RemoteErrorKind {
    /// Classify a handler failure.
    pub fn of(err: &HandlerError) -> Self {
        if err.is::<MalformedRequest>() {
            Self::MalformedRequest
        } else {
            Self::Handler
        }
    }
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedRequest => f.write_str("malformed request"),
            Self::Handler => f.write_str("handler"),
        }
    }
}

/// Handler error for a request buffer that could not be decoded.
///
/// Returning it from a handler reports [`RemoteErrorKind::MalformedRequest`]
/// to the caller instead of [`RemoteErrorKind::Handler`].
#[derive(Debug, thiserror::Error)]
#[error("malformed request: {0}")]
pub struct MalformedRequest(#[source] pub HandlerError);
