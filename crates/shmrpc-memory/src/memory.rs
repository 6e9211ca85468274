use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::buffer::{ConstBlob, Lease};
use crate::error::{MemoryError, Result};

static NEXT_MEMORY_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static Mutex<HashMap<String, Weak<SharedMemory>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Weak<SharedMemory>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// A named shared-memory segment.
///
/// The segment is a byte budget: every block allocated from it through a
/// [`BufferPool`](crate::BufferPool) is charged against `capacity` until the
/// last [`ConstBlob`] referencing the block is released. Live blocks are
/// indexed by address so that a byte range handed back by the application
/// can be recognised as already living in this segment.
pub struct SharedMemory {
    name: String,
    id: u64,
    capacity: usize,
    used: AtomicUsize,
    blocks: Mutex<BTreeMap<usize, Weak<Lease>>>,
}

impl SharedMemory {
    /// Create a new named segment with `capacity` bytes.
    ///
    /// Fails if a segment with the same name is still alive in this process.
    pub fn create(name: impl Into<String>, capacity: usize) -> Result<Arc<Self>> {
        let name = name.into();
        if capacity == 0 {
            return Err(MemoryError::InvalidCapacity(capacity));
        }

        let mut registry = registry().lock();
        if registry
            .get(&name)
            .is_some_and(|existing| existing.strong_count() > 0)
        {
            return Err(MemoryError::AlreadyExists(name));
        }

        let memory = Arc::new(Self {
            name: name.clone(),
            id: NEXT_MEMORY_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            used: AtomicUsize::new(0),
            blocks: Mutex::new(BTreeMap::new()),
        });
        registry.insert(name, Arc::downgrade(&memory));

        debug!(name = %memory.name, id = memory.id, capacity, "created shared memory");
        Ok(memory)
    }

    /// Open an existing live segment by name.
    pub fn open(name: &str) -> Result<Arc<Self>> {
        registry()
            .lock()
            .get(name)
            .and_then(Weak::upgrade)
            .ok_or_else(|| MemoryError::NotFound(name.to_string()))
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-unique segment identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently charged against the segment.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Bytes still available for allocation.
    pub fn available(&self) -> usize {
        self.capacity.saturating_sub(self.used())
    }

    /// Returns true if `data` lies entirely inside one live block of this segment.
    pub fn contains(&self, data: &[u8]) -> bool {
        self.locate(data).is_some()
    }

    /// Find the live block holding `data` and return a view of it without copying.
    ///
    /// Returns `None` for empty ranges and for ranges that do not lie entirely
    /// inside a single block of this segment.
    pub fn locate(&self, data: &[u8]) -> Option<ConstBlob> {
        if data.is_empty() {
            return None;
        }

        let start = data.as_ptr() as usize;
        let end = start.checked_add(data.len())?;

        let lease = {
            let blocks = self.blocks.lock();
            let (_, block) = blocks.range(..=start).next_back()?;
            block.upgrade()?
        };

        let block = lease.bytes();
        let block_start = block.as_ptr() as usize;
        if end > block_start + block.len() {
            return None;
        }

        let offset = start - block_start;
        let view = block.slice(offset..offset + data.len());
        Some(ConstBlob::leased(view, lease))
    }

    pub(crate) fn reserve(&self, size: usize) -> Result<()> {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(size).filter(|total| *total <= self.capacity)
            })
            .map(|_| ())
            .map_err(|used| {
                warn!(name = %self.name, requested = size, used, "shared memory exhausted");
                MemoryError::OutOfMemory {
                    name: self.name.clone(),
                    requested: size,
                    available: self.capacity.saturating_sub(used),
                }
            })
    }

    pub(crate) fn unreserve(&self, size: usize) {
        self.used.fetch_sub(size, Ordering::AcqRel);
    }

    pub(crate) fn register(&self, lease: &Arc<Lease>) {
        let block = lease.bytes();
        if !block.is_empty() {
            self.blocks
                .lock()
                .insert(block.as_ptr() as usize, Arc::downgrade(lease));
        }
    }

    /// Drop the index entry of a block that is being released.
    ///
    /// Called while the block is still allocated, so no other live block can
    /// share its start address.
    pub(crate) fn unregister(&self, start: usize) {
        self.blocks.lock().remove(&start);
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        let mut registry = registry().lock();
        if registry
            .get(&self.name)
            .is_some_and(|entry| entry.strong_count() == 0)
        {
            registry.remove(&self.name);
        }
        debug!(name = %self.name, id = self.id, "released shared memory");
    }
}

impl fmt::Debug for SharedMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedMemory")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("used", &self.used())
            .finish()
    }
}
