//! Named shared-memory segments and pooled, reference-counted buffers.
//!
//! A [`SharedMemory`] is a named byte budget that owns every block carved
//! out of it. A [`BufferPool`] hands out writable [`Blob`]s from one
//! segment; frozen blobs become immutable [`ConstBlob`]s whose last clone
//! returns the bytes to the segment. A [`ConstBuffer`] is an ordered list
//! of const blobs forming one payload.

pub mod buffer;
pub mod error;
pub mod memory;
pub mod pool;

pub use buffer::{ConstBlob, ConstBuffer};
pub use error::{MemoryError, Result};
pub use memory::SharedMemory;
pub use pool::{Blob, BufferPool, PoolStats};
