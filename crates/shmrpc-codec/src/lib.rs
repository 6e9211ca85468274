//! Protocol dispatch and serialization over pooled shared-memory buffers.
//!
//! A [`Strategy`] is one of six stateless (protocol, marshal) combinations,
//! chosen once from configuration. A [`Serializer`] binds a strategy to the
//! buffer pool and input segment of one connection and converts typed
//! values to and from [`ConstBuffer`](shmrpc_memory::ConstBuffer)s.

pub mod blob;
pub mod error;
pub mod protocol;
pub mod serializer;
pub mod strategy;
pub mod stream;

pub use blob::Blob;
pub use error::{CodecError, Result};
pub use protocol::{Protocol, COMPACT_BINARY_TAG, FAST_BINARY_TAG, SIMPLE_BINARY_TAG};
pub use serializer::Serializer;
pub use strategy::{Strategy, MARSHAL_HEADER_SIZE, MARSHAL_VERSION};
pub use stream::{ActiveInput, InputStream, OutputStream, DEFAULT_CHUNK_SIZE};
