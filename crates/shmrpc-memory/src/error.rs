/// Errors that can occur while managing shared memory and pooled buffers.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A live segment with the same name already exists.
    #[error("shared memory '{0}' already exists")]
    AlreadyExists(String),

    /// No live segment with the given name exists.
    #[error("shared memory '{0}' not found")]
    NotFound(String),

    /// The segment cannot satisfy an allocation.
    #[error("shared memory '{name}' exhausted ({requested} bytes requested, {available} available)")]
    OutOfMemory {
        name: String,
        requested: usize,
        available: usize,
    },

    /// A segment was requested with an unusable capacity.
    #[error("invalid shared memory capacity: {0}")]
    InvalidCapacity(usize),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
