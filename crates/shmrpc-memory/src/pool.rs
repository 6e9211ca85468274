use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::BytesMut;

use crate::buffer::{ConstBlob, ConstBuffer, Lease};
use crate::error::Result;
use crate::memory::SharedMemory;

/// Outstanding-allocation counters shared by a pool and its leases.
#[derive(Default)]
pub(crate) struct PoolCounters {
    blobs: AtomicUsize,
    bytes: AtomicUsize,
}

impl PoolCounters {
    fn acquire(&self, bytes: usize) {
        self.blobs.fetch_add(1, Ordering::AcqRel);
        self.bytes.fetch_add(bytes, Ordering::AcqRel);
    }

    fn shrink(&self, bytes: usize) {
        self.bytes.fetch_sub(bytes, Ordering::AcqRel);
    }

    pub(crate) fn release(&self, bytes: usize) {
        self.blobs.fetch_sub(1, Ordering::AcqRel);
        self.bytes.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Snapshot of a pool's outstanding allocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Blobs taken from the pool and not yet released.
    pub outstanding_blobs: usize,
    /// Bytes held by those blobs.
    pub outstanding_bytes: usize,
}

/// Allocates blobs from one shared-memory segment.
///
/// Cloning a pool is cheap; clones share the segment and the accounting.
#[derive(Clone)]
pub struct BufferPool {
    memory: Arc<SharedMemory>,
    counters: Arc<PoolCounters>,
}

impl BufferPool {
    /// Create a pool over `memory`.
    pub fn new(memory: Arc<SharedMemory>) -> Self {
        Self {
            memory,
            counters: Arc::new(PoolCounters::default()),
        }
    }

    /// The segment blobs are allocated from.
    pub fn memory(&self) -> &Arc<SharedMemory> {
        &self.memory
    }

    /// Take a writable blob with room for `capacity` bytes.
    pub fn take_blob(&self, capacity: usize) -> Result<Blob> {
        self.memory.reserve(capacity)?;
        self.counters.acquire(capacity);
        Ok(Blob {
            data: BytesMut::with_capacity(capacity),
            reserved: capacity,
            pool: self.clone(),
            frozen: false,
        })
    }

    /// Copy `data` into a new const blob.
    pub fn make_blob(&self, data: &[u8]) -> Result<ConstBlob> {
        let mut blob = self.take_blob(data.len())?;
        blob.append(data);
        Ok(blob.freeze())
    }

    /// Copy `data` into a new single-blob buffer.
    pub fn make_buffer(&self, data: &[u8]) -> Result<ConstBuffer> {
        self.make_blob(data).map(ConstBuffer::from)
    }

    /// Outstanding allocations of this pool.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            outstanding_blobs: self.counters.blobs.load(Ordering::Acquire),
            outstanding_bytes: self.counters.bytes.load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("memory", &self.memory.name())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A writable blob with a fixed capacity.
///
/// Writes never grow the blob past the capacity reserved from the segment.
/// Dropping an unfrozen blob returns its reservation.
#[derive(Debug)]
pub struct Blob {
    data: BytesMut,
    reserved: usize,
    pool: BufferPool,
    frozen: bool,
}

impl Blob {
    /// Bytes that can still be appended.
    pub fn remaining(&self) -> usize {
        self.reserved - self.data.len()
    }

    /// Append as much of `data` as fits and return the number of bytes copied.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining());
        self.data.extend_from_slice(&data[..n]);
        n
    }

    /// Seal the blob. Unused capacity goes back to the segment.
    pub fn freeze(mut self) -> ConstBlob {
        self.frozen = true;

        let bytes = std::mem::take(&mut self.data).freeze();
        let unused = self.reserved - bytes.len();
        self.pool.memory.unreserve(unused);
        self.pool.counters.shrink(unused);

        let lease = Arc::new(Lease::new(
            self.pool.memory.clone(),
            bytes.clone(),
            self.pool.counters.clone(),
        ));
        self.pool.memory.register(&lease);
        ConstBlob::leased(bytes, lease)
    }
}

impl Deref for Blob {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for Blob {
    fn drop(&mut self) {
        if !self.frozen {
            self.pool.memory.unreserve(self.reserved);
            self.pool.counters.release(self.reserved);
        }
    }
}
