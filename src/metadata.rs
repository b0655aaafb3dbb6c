//! Pooled, reference-counted metadata containers.
//!
//! Frames carry an optional side-channel record (stream ids, timestamps,
//! gains, whatever a stage defines) drawn from a fixed-size pool. The
//! pipeline runs at a fixed cadence, so heap-allocating a record per frame
//! would add allocator jitter; a pre-sized pool bounds memory and keeps the
//! hot path allocation-free.
//!
//! Reference counting decouples metadata lifetime from frame lifetime:
//! a record can travel to a downstream buffer while the source slot is
//! already being refilled. [`MetadataRef`] is the RAII handle — clone
//! increments, drop decrements, and the container returns to the pool
//! scrubbed when the last reference goes away.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

struct Container {
    ref_count: AtomicU32,
    record: Mutex<Box<[u8]>>,
}

struct PoolInner {
    name: String,
    object_size: usize,
    containers: Vec<Container>,
    free: Mutex<Vec<usize>>,
}

/// A fixed-size pool of reference-counted metadata containers.
///
/// Cloning the pool handle is cheap and shares the same containers.
/// Capacity is fixed at construction; an exhausted pool returns `None`
/// from [`request`](MetadataPool::request) rather than allocating.
#[derive(Clone)]
pub struct MetadataPool {
    inner: Arc<PoolInner>,
}

impl MetadataPool {
    /// Create a pool of `capacity` containers of `object_size` bytes each,
    /// all zeroed and free.
    pub fn new(capacity: usize, object_size: usize, name: impl Into<String>) -> Self {
        assert!(capacity > 0, "metadata pool capacity must be > 0");
        assert!(object_size > 0, "metadata object size must be > 0");

        let containers = (0..capacity)
            .map(|_| Container {
                ref_count: AtomicU32::new(0),
                record: Mutex::new(vec![0u8; object_size].into_boxed_slice()),
            })
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                object_size,
                containers,
                free: Mutex::new((0..capacity).rev().collect()),
            }),
        }
    }

    /// Draw a container from the pool with its reference count set to 1.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn request(&self) -> Option<MetadataRef> {
        let index = self.inner.free.lock().unwrap().pop();
        let Some(index) = index else {
            tracing::warn!(pool = %self.inner.name, "metadata pool exhausted");
            return None;
        };

        let container = &self.inner.containers[index];
        debug_assert_eq!(container.ref_count.load(Ordering::Acquire), 0);
        container.ref_count.store(1, Ordering::Release);

        Some(MetadataRef {
            pool: Arc::clone(&self.inner),
            index,
        })
    }

    /// The pool's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Size of each metadata record in bytes.
    pub fn object_size(&self) -> usize {
        self.inner.object_size
    }

    /// Total number of containers.
    pub fn capacity(&self) -> usize {
        self.inner.containers.len()
    }

    /// Number of containers currently free.
    ///
    /// A snapshot; may change immediately after returning.
    pub fn available(&self) -> usize {
        self.inner.free.lock().unwrap().len()
    }
}

impl std::fmt::Debug for MetadataPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataPool")
            .field("name", &self.inner.name)
            .field("object_size", &self.inner.object_size)
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// A counted reference to one metadata container.
///
/// Clone to share the record with another frame slot; the container goes
/// back to its pool (scrubbed to zero) when the last reference drops.
pub struct MetadataRef {
    pool: Arc<PoolInner>,
    index: usize,
}

impl MetadataRef {
    /// Lock the record for reading or writing.
    ///
    /// Stages sharing a record across buffers serialize access through
    /// this lock.
    pub fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.pool.containers[self.index].record.lock().unwrap()
    }

    /// Size of the record in bytes.
    pub fn size(&self) -> usize {
        self.pool.object_size
    }

    /// Current reference count (for debugging).
    pub fn ref_count(&self) -> u32 {
        self.pool.containers[self.index]
            .ref_count
            .load(Ordering::Acquire)
    }

    /// True if both refs point at the same container.
    pub fn same_container(&self, other: &MetadataRef) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool) && self.index == other.index
    }
}

impl Clone for MetadataRef {
    fn clone(&self) -> Self {
        let prev = self.pool.containers[self.index]
            .ref_count
            .fetch_add(1, Ordering::Relaxed);
        debug_assert!(prev > 0);
        Self {
            pool: Arc::clone(&self.pool),
            index: self.index,
        }
    }
}

impl Drop for MetadataRef {
    fn drop(&mut self) {
        let container = &self.pool.containers[self.index];
        if container.ref_count.fetch_sub(1, Ordering::Release) == 1 {
            std::sync::atomic::fence(Ordering::Acquire);
            // Scrub before the container becomes visible as free.
            container.record.lock().unwrap().fill(0);
            self.pool.free.lock().unwrap().push(self.index);
        }
    }
}

impl std::fmt::Debug for MetadataRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataRef")
            .field("pool", &self.pool.name)
            .field("index", &self.index)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
