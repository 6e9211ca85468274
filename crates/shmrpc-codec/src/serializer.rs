use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use shmrpc_memory::{BufferPool, ConstBuffer, SharedMemory};

use crate::error::{CodecError, Result};
use crate::protocol::Protocol;
use crate::stream::{InputStream, OutputStream};
use crate::strategy::Strategy;

/// A strategy bound to the memory of one connection.
///
/// Output is written into buffers drawn from `pool`; input buffers must be
/// backed by `input_memory`. The serializer holds no per-call state and can
/// be shared by concurrent calls on the same connection.
#[derive(Debug, Clone)]
pub struct Serializer {
    strategy: Strategy,
    pool: BufferPool,
    input_memory: Arc<SharedMemory>,
    min_blob_size: usize,
}

impl Serializer {
    pub fn new(
        protocol: Protocol,
        marshal: bool,
        pool: BufferPool,
        input_memory: Arc<SharedMemory>,
        min_blob_size: usize,
    ) -> Self {
        Self::with_strategy(
            Strategy::create(protocol, marshal),
            pool,
            input_memory,
            min_blob_size,
        )
    }

    /// Bind an already selected strategy.
    pub fn with_strategy(
        strategy: Strategy,
        pool: BufferPool,
        input_memory: Arc<SharedMemory>,
        min_blob_size: usize,
    ) -> Self {
        Self {
            strategy,
            pool,
            input_memory,
            min_blob_size,
        }
    }

    /// Serialize `value` into a new pooled buffer.
    ///
    /// Blocks already allocated from the pool may be referenced rather than
    /// copied; on failure every blob written so far is released.
    pub fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<ConstBuffer> {
        let mut output = OutputStream::new(&self.pool, self.min_blob_size);
        match self.strategy.serialize(&mut output, value) {
            Ok(()) => Ok(output.finish()),
            Err(err) => Err(output.take_error().map(CodecError::Memory).unwrap_or(err)),
        }
    }

    /// Deserialize one value from `buffer`.
    ///
    /// The buffer is borrowed; the caller keeps ownership whether or not
    /// decoding succeeds. [`Blob`](crate::Blob) fields of the result may
    /// share leases with `buffer`.
    pub fn deserialize<T: DeserializeOwned>(&self, buffer: &ConstBuffer) -> Result<T> {
        let input = InputStream::new(buffer, &self.input_memory)?;
        let _active = input.activate();
        self.strategy.deserialize(input, buffer.len() as u64)
    }

    pub fn protocol(&self) -> Protocol {
        self.strategy.protocol()
    }

    pub fn is_marshaled(&self) -> bool {
        self.strategy.is_marshaled()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn input_memory(&self) -> &Arc<SharedMemory> {
        &self.input_memory
    }

    pub fn min_blob_size(&self) -> usize {
        self.min_blob_size
    }
}
