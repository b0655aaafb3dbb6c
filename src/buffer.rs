//! The multi-producer / multi-consumer frame ring.
//!
//! A [`FrameBuffer`] is a named ring of N fixed-size frame slots. Stages
//! register as producers or consumers, then cycle: acquire an empty
//! (producer) or full (consumer) slot, fill or read it, release it. Slots
//! move `empty -> filling -> full -> draining -> empty`; a slot becomes
//! full only when every registered producer has marked it, and empty only
//! when every registered consumer has. Data never moves between stages —
//! they exchange slot indices, and payloads stay where they were written.
//!
//! All public operations are thread safe. Only the `wait_for_*` calls
//! block; they return the shutdown sentinel once
//! [`send_shutdown_signal`](FrameBuffer::send_shutdown_signal) fires.
//!
//! # Example
//!
//! ```rust,ignore
//! use fringe::buffer::BufferConfig;
//!
//! let buf = BufferConfig::new("gpu_input", 16 * 1024 * 1024, 4).build()?;
//! buf.register_producer("net_capture")?;
//! buf.register_consumer("correlator")?;
//!
//! let mut frame = buf.wait_for_empty("net_capture", 0).unwrap();
//! frame.as_mut_slice()[..4].copy_from_slice(b"data");
//! buf.mark_full("net_capture", 0);
//! ```

use crate::error::{Error, Result};
use crate::memory::FrameRegion;
use crate::metadata::{MetadataPool, MetadataRef};
use crate::zeroing::Zeroer;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

/// Upper bound on producers or consumers per buffer; keeps each slot's
/// done set a single word.
pub const MAX_ROLE_CAPACITY: usize = 64;

const DEFAULT_ROLE_CAPACITY: usize = 10;

/// Per-buffer configuration, handed in by the pipeline builder.
///
/// Everything the fabric consults at runtime is fixed here; nothing else
/// is read once the buffer is built.
#[derive(Clone)]
pub struct BufferConfig {
    name: String,
    kind: String,
    num_frames: usize,
    frame_size: usize,
    aligned_frame_size: usize,
    numa_node: Option<u32>,
    metadata_pool: Option<MetadataPool>,
    zero_on_release: bool,
    zeroing_cpu: Option<usize>,
    producer_capacity: usize,
    consumer_capacity: usize,
}

impl BufferConfig {
    /// Start a configuration for a ring of `num_frames` slots of
    /// `frame_size` bytes.
    ///
    /// The aligned frame size defaults to `frame_size` rounded up to the
    /// page size, so DMA transfers never carry partial pages.
    pub fn new(name: impl Into<String>, frame_size: usize, num_frames: usize) -> Self {
        let page = rustix::param::page_size();
        Self {
            name: name.into(),
            kind: "standard".into(),
            num_frames,
            frame_size,
            aligned_frame_size: frame_size.div_ceil(page) * page,
            numa_node: None,
            metadata_pool: None,
            zero_on_release: false,
            zeroing_cpu: None,
            producer_capacity: DEFAULT_ROLE_CAPACITY,
            consumer_capacity: DEFAULT_ROLE_CAPACITY,
        }
    }

    /// Set the free-form buffer type tag.
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Override the aligned (allocated) frame size.
    ///
    /// # Panics
    ///
    /// Panics if smaller than the frame size.
    pub fn with_aligned_frame_size(mut self, aligned: usize) -> Self {
        assert!(
            aligned >= self.frame_size,
            "aligned frame size must be >= frame size"
        );
        self.aligned_frame_size = aligned;
        self
    }

    /// Allocate frame memory on one NUMA node.
    pub fn with_numa_node(mut self, node: u32) -> Self {
        self.numa_node = Some(node);
        self
    }

    /// Attach a metadata pool for producers to draw from.
    pub fn with_metadata_pool(mut self, pool: MetadataPool) -> Self {
        self.metadata_pool = Some(pool);
        self
    }

    /// Scrub frames to zero before their slot is shown as empty again.
    pub fn with_zero_on_release(mut self) -> Self {
        self.zero_on_release = true;
        self
    }

    /// Pin the zeroing worker to one CPU.
    pub fn with_zeroing_cpu(mut self, cpu: usize) -> Self {
        self.zeroing_cpu = Some(cpu);
        self
    }

    /// Set the fixed capacities of the producer and consumer tables.
    ///
    /// # Panics
    ///
    /// Panics if either is zero or exceeds [`MAX_ROLE_CAPACITY`].
    pub fn with_role_capacity(mut self, producers: usize, consumers: usize) -> Self {
        assert!(
            (1..=MAX_ROLE_CAPACITY).contains(&producers)
                && (1..=MAX_ROLE_CAPACITY).contains(&consumers),
            "role capacity must be in 1..={MAX_ROLE_CAPACITY}"
        );
        self.producer_capacity = producers;
        self.consumer_capacity = consumers;
        self
    }

    /// Build the buffer: allocate all frames and spawn the zeroing worker
    /// if configured.
    pub fn build(self) -> Result<FrameBuffer> {
        FrameBuffer::new(self)
    }
}

struct RoleRow {
    in_use: bool,
    name: String,
    last_frame_acquired: Option<usize>,
    last_frame_released: Option<usize>,
}

struct RoleTable {
    label: &'static str,
    rows: Vec<RoleRow>,
}

impl RoleTable {
    fn new(label: &'static str, capacity: usize) -> Self {
        let rows = (0..capacity)
            .map(|_| RoleRow {
                in_use: false,
                name: String::new(),
                last_frame_acquired: None,
                last_frame_released: None,
            })
            .collect();
        Self { label, rows }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.in_use && row.name == name)
    }

    fn register(&mut self, buffer: &str, name: &str) -> Result<usize> {
        if self.find(name).is_some() {
            return Err(Error::DuplicateRole {
                buffer: buffer.into(),
                role: self.label,
                name: name.into(),
            });
        }
        let Some(idx) = self.rows.iter().position(|row| !row.in_use) else {
            return Err(Error::RoleTableFull {
                buffer: buffer.into(),
                role: self.label,
            });
        };
        let row = &mut self.rows[idx];
        row.in_use = true;
        row.name = name.into();
        row.last_frame_acquired = None;
        row.last_frame_released = None;
        Ok(idx)
    }

    fn unregister(&mut self, buffer: &str, name: &str) -> Result<usize> {
        let Some(idx) = self.find(name) else {
            return Err(Error::UnknownRole {
                buffer: buffer.into(),
                role: self.label,
                name: name.into(),
            });
        };
        let row = &mut self.rows[idx];
        row.in_use = false;
        row.name.clear();
        Ok(idx)
    }

    fn in_use_mask(&self) -> u64 {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| row.in_use)
            .fold(0u64, |mask, (idx, _)| mask | (1 << idx))
    }

    fn count(&self) -> usize {
        self.rows.iter().filter(|row| row.in_use).count()
    }
}

pub(crate) struct RingState {
    pub(crate) frames: Vec<FrameRegion>,
    pub(crate) metadata: Vec<Option<MetadataRef>>,
    full: Vec<bool>,
    /// Slots queued on or being scrubbed by the zeroing worker.
    zeroing: Vec<bool>,
    producers_done: Vec<u64>,
    consumers_done: Vec<u64>,
    producers: RoleTable,
    consumers: RoleTable,
    shutdown: bool,
    zero_on_release: bool,
    last_arrival: Option<Instant>,
}

impl RingState {
    fn all_producers_done(&self, slot: usize) -> bool {
        (self.producers.in_use_mask() & !self.producers_done[slot]) == 0
    }

    fn all_consumers_done(&self, slot: usize) -> bool {
        (self.consumers.in_use_mask() & !self.consumers_done[slot]) == 0
    }
}

pub(crate) struct BufferInner {
    name: String,
    kind: String,
    num_frames: usize,
    frame_size: usize,
    aligned_frame_size: usize,
    metadata_pool: Option<MetadataPool>,
    pub(crate) state: Mutex<RingState>,
    full_cond: Condvar,
    empty_cond: Condvar,
    zeroer: Option<Zeroer>,
}

/// A named ring of fixed-size frame slots with a multi-producer /
/// multi-consumer handshake.
///
/// The handle is cheap to clone; clones share the same ring.
pub struct FrameBuffer {
    pub(crate) inner: Arc<BufferInner>,
}

/// Outcome of [`FrameBuffer::wait_for_full_timeout`].
#[derive(Debug)]
pub enum TimedWait<'a> {
    /// The slot became full (and this consumer had not yet released it)
    /// before the deadline.
    Frame(FrameRef<'a>),
    /// The deadline elapsed first.
    Timeout,
    /// The buffer was shut down.
    Shutdown,
}

impl<'a> TimedWait<'a> {
    /// The acquired frame, if any.
    pub fn frame(self) -> Option<FrameRef<'a>> {
        match self {
            TimedWait::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    /// True if the deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimedWait::Timeout)
    }

    /// True if the buffer was shut down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, TimedWait::Shutdown)
    }
}

/// Access to one acquired frame's bytes.
///
/// Content synchronization is by handoff: a producer holds exclusive
/// access between its `wait_for_empty` and its `mark_full`; consumers read
/// between their `wait_for_full` and their `mark_empty`. The ref exposes
/// the buffer's frame size, not the (possibly larger) aligned allocation.
pub struct FrameRef<'a> {
    ptr: NonNull<u8>,
    len: usize,
    slot: usize,
    _buffer: PhantomData<&'a BufferInner>,
}

impl<'a> FrameRef<'a> {
    /// The slot index this frame occupies.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Usable frame size in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the frame has zero size.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pointer to the frame's bytes.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// Mutable pointer to the frame's bytes.
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The frame's bytes.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The frame's bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

// Frames may be handed to worker threads between acquire and release.
unsafe impl Send for FrameRef<'_> {}

impl std::fmt::Debug for FrameRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRef")
            .field("slot", &self.slot)
            .field("len", &self.len)
            .finish()
    }
}

impl FrameBuffer {
    fn new(config: BufferConfig) -> Result<Self> {
        assert!(config.num_frames > 0, "buffer must have at least one frame");

        let frames = (0..config.num_frames)
            .map(|_| FrameRegion::allocate(config.aligned_frame_size, config.numa_node))
            .collect::<Result<Vec<_>>>()?;

        let zeroer = if config.zero_on_release {
            Some(Zeroer::spawn(&config.name, config.zeroing_cpu)?)
        } else {
            None
        };

        tracing::debug!(
            buffer = %config.name,
            kind = %config.kind,
            num_frames = config.num_frames,
            frame_size = config.frame_size,
            aligned_frame_size = config.aligned_frame_size,
            "created frame buffer"
        );

        Ok(Self {
            inner: Arc::new(BufferInner {
                state: Mutex::new(RingState {
                    frames,
                    metadata: (0..config.num_frames).map(|_| None).collect(),
                    full: vec![false; config.num_frames],
                    zeroing: vec![false; config.num_frames],
                    producers_done: vec![0; config.num_frames],
                    consumers_done: vec![0; config.num_frames],
                    producers: RoleTable::new("producer", config.producer_capacity),
                    consumers: RoleTable::new("consumer", config.consumer_capacity),
                    shutdown: false,
                    zero_on_release: config.zero_on_release,
                    last_arrival: None,
                }),
                full_cond: Condvar::new(),
                empty_cond: Condvar::new(),
                name: config.name,
                kind: config.kind,
                num_frames: config.num_frames,
                frame_size: config.frame_size,
                aligned_frame_size: config.aligned_frame_size,
                metadata_pool: config.metadata_pool,
                zeroer,
            }),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, RingState> {
        self.inner.state.lock().unwrap()
    }

    fn role_index(table: &RoleTable, name: &str, buffer: &str) -> usize {
        match table.find(name) {
            Some(idx) => idx,
            None => panic!(
                "{} `{name}` is not registered on buffer `{buffer}`",
                table.label
            ),
        }
    }

    fn check_slot(&self, slot: usize) {
        assert!(
            slot < self.inner.num_frames,
            "slot {slot} out of range on buffer `{}` ({} frames)",
            self.inner.name,
            self.inner.num_frames
        );
    }

    fn frame_ref(&self, state: &RingState, slot: usize) -> FrameRef<'_> {
        FrameRef {
            ptr: state.frames[slot].ptr(),
            len: self.inner.frame_size,
            slot,
            _buffer: PhantomData,
        }
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a producer. Setup-time: call before data flows.
    pub fn register_producer(&self, name: &str) -> Result<()> {
        let mut state = self.lock_state();
        tracing::debug!(buffer = %self.inner.name, producer = %name, "registering producer");
        state.producers.register(&self.inner.name, name).map(|_| ())
    }

    /// Register a consumer. Setup-time: call before data flows.
    pub fn register_consumer(&self, name: &str) -> Result<()> {
        let mut state = self.lock_state();
        tracing::debug!(buffer = %self.inner.name, consumer = %name, "registering consumer");
        state.consumers.register(&self.inner.name, name).map(|_| ())
    }

    /// Remove a producer from the role table.
    ///
    /// No slot transitions result; partially-filled slots complete when the
    /// remaining producers mark them.
    pub fn unregister_producer(&self, name: &str) -> Result<()> {
        let mut state = self.lock_state();
        tracing::debug!(buffer = %self.inner.name, producer = %name, "unregistering producer");
        let idx = state.producers.unregister(&self.inner.name, name)?;
        let bit = 1u64 << idx;
        for slot in 0..self.inner.num_frames {
            state.producers_done[slot] &= !bit;
        }
        Ok(())
    }

    /// Remove a consumer from the role table.
    ///
    /// Any full slot left with every remaining consumer done transitions
    /// to empty, and producers are woken.
    pub fn unregister_consumer(&self, name: &str) -> Result<()> {
        let mut signal_empty = false;
        {
            let mut state = self.lock_state();
            tracing::debug!(buffer = %self.inner.name, consumer = %name, "unregistering consumer");
            let idx = state.consumers.unregister(&self.inner.name, name)?;
            let bit = 1u64 << idx;
            for slot in 0..self.inner.num_frames {
                state.consumers_done[slot] &= !bit;
            }
            for slot in 0..self.inner.num_frames {
                if state.full[slot] && state.all_consumers_done(slot) {
                    signal_empty |= self.empty_transition(&mut state, slot);
                }
            }
        }
        if signal_empty {
            self.inner.empty_cond.notify_all();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Acquire
    // ------------------------------------------------------------------

    /// Block until `slot` is empty and this producer has not already
    /// filled it since it was last emptied. Returns `None` on shutdown.
    ///
    /// The producer-done check forces a full round trip through empty: a
    /// producer that filled a slot and circled the ring cannot reacquire
    /// it until every consumer has released it.
    ///
    /// # Panics
    ///
    /// Panics if the producer is not registered or `slot` is out of range.
    pub fn wait_for_empty(&self, producer_name: &str, slot: usize) -> Option<FrameRef<'_>> {
        self.check_slot(slot);
        let mut state = self.lock_state();
        let idx = Self::role_index(&state.producers, producer_name, &self.inner.name);
        let bit = 1u64 << idx;

        loop {
            if state.shutdown {
                return None;
            }
            if !state.full[slot] && (state.producers_done[slot] & bit) == 0 && !state.zeroing[slot]
            {
                break;
            }
            tracing::trace!(
                buffer = %self.inner.name,
                producer = %producer_name,
                slot,
                "waiting for empty frame"
            );
            state = self.inner.empty_cond.wait(state).unwrap();
        }

        state.producers.rows[idx].last_frame_acquired = Some(slot);
        Some(self.frame_ref(&state, slot))
    }

    /// Block until `slot` is full and this consumer has not already
    /// released it. Returns `None` on shutdown.
    ///
    /// # Panics
    ///
    /// Panics if the consumer is not registered or `slot` is out of range.
    pub fn wait_for_full(&self, consumer_name: &str, slot: usize) -> Option<FrameRef<'_>> {
        self.check_slot(slot);
        let mut state = self.lock_state();
        let idx = Self::role_index(&state.consumers, consumer_name, &self.inner.name);
        let bit = 1u64 << idx;

        loop {
            if state.shutdown {
                return None;
            }
            if state.full[slot] && (state.consumers_done[slot] & bit) == 0 {
                break;
            }
            state = self.inner.full_cond.wait(state).unwrap();
        }

        state.consumers.rows[idx].last_frame_acquired = Some(slot);
        Some(self.frame_ref(&state, slot))
    }

    /// Like [`wait_for_full`](Self::wait_for_full) with an absolute
    /// deadline. A deadline already in the past polls the predicate once
    /// and returns without blocking.
    pub fn wait_for_full_timeout(
        &self,
        consumer_name: &str,
        slot: usize,
        deadline: Instant,
    ) -> TimedWait<'_> {
        self.check_slot(slot);
        let mut state = self.lock_state();
        let idx = Self::role_index(&state.consumers, consumer_name, &self.inner.name);
        let bit = 1u64 << idx;

        loop {
            if state.shutdown {
                return TimedWait::Shutdown;
            }
            if state.full[slot] && (state.consumers_done[slot] & bit) == 0 {
                break;
            }
            let now = Instant::now();
            if now >= deadline {
                return TimedWait::Timeout;
            }
            let (guard, _) = self
                .inner
                .full_cond
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = guard;
        }

        state.consumers.rows[idx].last_frame_acquired = Some(slot);
        TimedWait::Frame(self.frame_ref(&state, slot))
    }

    // ------------------------------------------------------------------
    // Release
    // ------------------------------------------------------------------

    /// Producer handoff: mark this producer done with `slot`.
    ///
    /// When the last producer marks, the slot becomes full and consumers
    /// are signalled. If no consumers are registered at that moment the
    /// frame is dropped: the slot transitions straight back to empty and
    /// its metadata is released, so the pipeline tolerates a transient
    /// absence of downstream stages without deadlocking.
    ///
    /// # Panics
    ///
    /// Panics on a double mark or an unregistered producer — both are
    /// stage bugs.
    pub fn mark_full(&self, producer_name: &str, slot: usize) {
        self.check_slot(slot);
        let mut signal_full = false;
        let mut signal_empty = false;
        {
            let mut state = self.lock_state();
            let idx = Self::role_index(&state.producers, producer_name, &self.inner.name);
            let bit = 1u64 << idx;
            assert!(
                (state.producers_done[slot] & bit) == 0,
                "producer `{producer_name}` marked frame {slot} full twice on buffer `{}`",
                self.inner.name
            );
            state.producers.rows[idx].last_frame_released = Some(slot);
            state.producers_done[slot] |= bit;

            if state.all_producers_done(slot) {
                state.producers_done[slot] = 0;
                state.full[slot] = true;
                state.last_arrival = Some(Instant::now());
                signal_full = true;

                if state.all_consumers_done(slot) {
                    tracing::debug!(
                        buffer = %self.inner.name,
                        slot,
                        "no consumers registered, dropping frame"
                    );
                    signal_empty = self.empty_transition(&mut state, slot);
                }
            }
        }
        if signal_full {
            self.inner.full_cond.notify_all();
        }
        if signal_empty {
            self.inner.empty_cond.notify_all();
        }
    }

    /// Consumer handoff: mark this consumer done with `slot`.
    ///
    /// When the last consumer marks, the slot's metadata reference is
    /// released and the slot transitions to empty — immediately, or after
    /// the zeroing worker has scrubbed it on a zero-on-release buffer.
    ///
    /// # Panics
    ///
    /// Panics on a double release or an unregistered consumer.
    pub fn mark_empty(&self, consumer_name: &str, slot: usize) {
        self.check_slot(slot);
        let signal_empty;
        {
            let mut state = self.lock_state();
            let idx = Self::role_index(&state.consumers, consumer_name, &self.inner.name);
            let bit = 1u64 << idx;
            assert!(
                (state.consumers_done[slot] & bit) == 0,
                "consumer `{consumer_name}` released frame {slot} twice on buffer `{}`",
                self.inner.name
            );
            state.consumers.rows[idx].last_frame_released = Some(slot);
            state.consumers_done[slot] |= bit;

            signal_empty = if state.all_consumers_done(slot) {
                self.empty_transition(&mut state, slot)
            } else {
                false
            };
        }
        if signal_empty {
            self.inner.empty_cond.notify_all();
        }
    }

    /// Empty transition for `slot`, under the lock: release bound metadata
    /// and either complete in place or hand the scrub to the zeroing
    /// worker. On a zero-on-release buffer the empty state (and the
    /// wake-up) becomes visible only after the scrub finishes, so the next
    /// producer always sees zero bytes. Returns true if the caller should
    /// signal the empty condvar after unlocking.
    fn empty_transition(&self, state: &mut RingState, slot: usize) -> bool {
        if state.zeroing[slot] {
            return false;
        }
        state.metadata[slot] = None;
        if state.zero_on_release {
            state.zeroing[slot] = true;
            self.schedule_zero(slot);
            false
        } else {
            state.full[slot] = false;
            state.consumers_done[slot] = 0;
            true
        }
    }

    fn schedule_zero(&self, slot: usize) {
        let inner = Arc::downgrade(&self.inner);
        let len = self.inner.frame_size;
        let job = Box::new(move || {
            let Some(inner) = inner.upgrade() else { return };
            let ptr = {
                let state = inner.state.lock().unwrap();
                state.frames[slot].ptr().as_ptr() as usize
            };
            // Scrub off the lock; the slot is not yet empty, so no
            // producer owns its contents.
            unsafe { std::ptr::write_bytes(ptr as *mut u8, 0, len) };
            {
                let mut state = inner.state.lock().unwrap();
                state.zeroing[slot] = false;
                state.full[slot] = false;
                state.consumers_done[slot] = 0;
            }
            inner.empty_cond.notify_all();
        });
        self.inner
            .zeroer
            .as_ref()
            .expect("zero-on-release buffer has a zeroing worker")
            .submit(job);
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    /// Draw a metadata container from the buffer's pool and bind it to
    /// `slot`, if the slot does not already carry one.
    pub fn allocate_new_metadata(&self, slot: usize) -> Result<()> {
        self.check_slot(slot);
        let pool = self
            .inner
            .metadata_pool
            .as_ref()
            .ok_or_else(|| Error::NoMetadataPool(self.inner.name.clone()))?;

        let mut state = self.lock_state();
        if state.metadata[slot].is_none() {
            let meta = pool
                .request()
                .ok_or_else(|| Error::MetadataPoolExhausted(pool.name().to_string()))?;
            state.metadata[slot] = Some(meta);
        }
        Ok(())
    }

    /// Cloned reference to the metadata bound to `slot`.
    ///
    /// # Panics
    ///
    /// Panics if no metadata is bound — producers must call
    /// [`allocate_new_metadata`](Self::allocate_new_metadata) first.
    pub fn get_metadata(&self, slot: usize) -> MetadataRef {
        self.get_metadata_container(slot).unwrap_or_else(|| {
            panic!(
                "no metadata bound to frame {slot} of buffer `{}`",
                self.inner.name
            )
        })
    }

    /// Cloned reference to the metadata bound to `slot`, or `None`.
    pub fn get_metadata_container(&self, slot: usize) -> Option<MetadataRef> {
        self.check_slot(slot);
        self.lock_state().metadata[slot].clone()
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// True if `slot` is currently empty. A snapshot; the state may change
    /// immediately after returning.
    pub fn is_empty(&self, slot: usize) -> bool {
        self.check_slot(slot);
        !self.lock_state().full[slot]
    }

    /// Number of slots currently full.
    pub fn full_count(&self) -> usize {
        self.lock_state().full.iter().filter(|&&f| f).count()
    }

    /// Number of registered producers.
    pub fn producer_count(&self) -> usize {
        self.lock_state().producers.count()
    }

    /// Number of registered consumers.
    pub fn consumer_count(&self) -> usize {
        self.lock_state().consumers.count()
    }

    /// When the most recent slot transitioned to full.
    pub fn last_arrival_time(&self) -> Option<Instant> {
        self.lock_state().last_arrival
    }

    /// The buffer's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The buffer's free-form type tag.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// Number of slots in the ring.
    pub fn num_frames(&self) -> usize {
        self.inner.num_frames
    }

    /// Usable frame size in bytes.
    pub fn frame_size(&self) -> usize {
        self.inner.frame_size
    }

    /// Allocated (page-aligned) frame size in bytes.
    pub fn aligned_frame_size(&self) -> usize {
        self.inner.aligned_frame_size
    }

    /// The attached metadata pool, if any.
    pub fn metadata_pool(&self) -> Option<&MetadataPool> {
        self.inner.metadata_pool.as_ref()
    }

    /// Log a one-line ring occupancy summary (`X` full, `_` empty).
    pub fn print_status(&self) {
        let status: String = {
            let state = self.lock_state();
            state
                .full
                .iter()
                .map(|&f| if f { 'X' } else { '_' })
                .collect()
        };
        tracing::info!(buffer = %self.inner.name, status = %status, "buffer status");
    }

    /// Log the ring occupancy plus one row per registered role with its
    /// per-slot done marks and last acquired/released indices.
    pub fn print_full_status(&self) {
        let state = self.lock_state();
        let fmt_last = |v: Option<usize>| v.map_or(-1i64, |s| s as i64);

        let status: String = state
            .full
            .iter()
            .map(|&f| if f { 'X' } else { '_' })
            .collect();
        tracing::info!(buffer = %self.inner.name, full = %status, "ring status");

        for (idx, row) in state.producers.rows.iter().enumerate() {
            if !row.in_use {
                continue;
            }
            let done: String = (0..self.inner.num_frames)
                .map(|s| {
                    if (state.producers_done[s] & (1 << idx)) != 0 {
                        '+'
                    } else {
                        '_'
                    }
                })
                .collect();
            tracing::info!(
                buffer = %self.inner.name,
                producer = %row.name,
                done = %done,
                last_acquired = fmt_last(row.last_frame_acquired),
                last_released = fmt_last(row.last_frame_released),
                "producer status"
            );
        }
        for (idx, row) in state.consumers.rows.iter().enumerate() {
            if !row.in_use {
                continue;
            }
            let done: String = (0..self.inner.num_frames)
                .map(|s| {
                    if (state.consumers_done[s] & (1 << idx)) != 0 {
                        '='
                    } else {
                        '_'
                    }
                })
                .collect();
            tracing::info!(
                buffer = %self.inner.name,
                consumer = %row.name,
                done = %done,
                last_acquired = fmt_last(row.last_frame_acquired),
                last_released = fmt_last(row.last_frame_released),
                "consumer status"
            );
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    /// Stop the buffer: every blocked and future `wait_for_*` returns the
    /// shutdown sentinel.
    pub fn send_shutdown_signal(&self) {
        {
            let mut state = self.lock_state();
            tracing::info!(buffer = %self.inner.name, "shutdown signal");
            state.shutdown = true;
        }
        self.inner.empty_cond.notify_all();
        self.inner.full_cond.notify_all();
    }
}

impl Clone for FrameBuffer {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("name", &self.inner.name)
            .field("kind", &self.inner.kind)
            .field("num_frames", &self.inner.num_frames)
            .field("frame_size", &self.inner.frame_size)
            .field("full_count", &self.full_count())
            .finish()
    }
}
