//! Inter-buffer operators: moving metadata and frame memory between rings.
//!
//! Between adjacent stages on the same host the semantics are "pass the
//! frame along", and payloads are tens of MB — so frames move by exchanging
//! storage, not by copying bytes. The copy branch in
//! [`safe_swap_frame`] exists only for fan-out, where the source must stay
//! intact for its other consumers.
//!
//! [`copy_metadata`] takes both buffer locks in address order;
//! [`pass_metadata`] never holds more than one lock at a time. Callers of
//! the swap operators guarantee the single-role conditions at setup time.

use crate::buffer::FrameBuffer;
use crate::buffer::RingState;
use crate::error::{Error, Result};
use crate::memory::FrameRegion;
use std::sync::{Arc, MutexGuard};

fn check_slot(buf: &FrameBuffer, slot: usize) {
    assert!(
        slot < buf.num_frames(),
        "slot {slot} out of range on buffer `{}` ({} frames)",
        buf.name(),
        buf.num_frames()
    );
}

/// Lock two distinct buffers' states in address order.
fn lock_pair<'a>(
    a: &'a FrameBuffer,
    b: &'a FrameBuffer,
) -> (MutexGuard<'a, RingState>, MutexGuard<'a, RingState>) {
    assert!(
        !Arc::ptr_eq(&a.inner, &b.inner),
        "source and destination buffers must differ"
    );
    if Arc::as_ptr(&a.inner) < Arc::as_ptr(&b.inner) {
        let ga = a.inner.state.lock().unwrap();
        let gb = b.inner.state.lock().unwrap();
        (ga, gb)
    } else {
        let gb = b.inner.state.lock().unwrap();
        let ga = a.inner.state.lock().unwrap();
        (ga, gb)
    }
}

/// Share the metadata container on `from`'s slot with `to`'s slot,
/// incrementing its reference count.
///
/// Idempotent when the destination already holds that exact container.
/// Warns and does nothing when the source slot carries no metadata.
///
/// # Panics
///
/// Panics if the destination slot already holds a *different* container —
/// that means two stages disagree about the frame's identity.
pub fn pass_metadata(from: &FrameBuffer, from_slot: usize, to: &FrameBuffer, to_slot: usize) {
    check_slot(from, from_slot);
    check_slot(to, to_slot);

    // Clone under the source lock only; the caller holds the source frame,
    // so the binding cannot change underneath us.
    let source = from.inner.state.lock().unwrap().metadata[from_slot].clone();
    let Some(source) = source else {
        tracing::warn!(
            buffer = %from.name(),
            slot = from_slot,
            "no metadata in source frame, was this intended?"
        );
        return;
    };

    let mut state = to.inner.state.lock().unwrap();
    match &state.metadata[to_slot] {
        None => state.metadata[to_slot] = Some(source),
        Some(existing) => {
            // Already moved: the extra clone drops and the count is
            // unchanged.
            assert!(
                existing.same_container(&source),
                "frame {to_slot} of buffer `{}` already holds a different metadata container",
                to.name()
            );
        }
    }
}

/// Copy the metadata record bytes from `from`'s slot to `to`'s slot.
///
/// A value copy: reference counts are unaffected. Warns and leaves the
/// destination unchanged when either slot has no metadata or the record
/// sizes differ.
pub fn copy_metadata(from: &FrameBuffer, from_slot: usize, to: &FrameBuffer, to_slot: usize) {
    check_slot(from, from_slot);
    check_slot(to, to_slot);

    let (from_state, to_state) = lock_pair(from, to);

    let Some(src) = &from_state.metadata[from_slot] else {
        tracing::warn!(
            buffer = %from.name(),
            slot = from_slot,
            "no metadata in source frame, was this intended?"
        );
        return;
    };
    let Some(dst) = &to_state.metadata[to_slot] else {
        tracing::warn!(
            buffer = %to.name(),
            slot = to_slot,
            "no metadata in destination frame, was this intended?"
        );
        return;
    };

    if src.size() != dst.size() {
        tracing::warn!(
            src = %from.name(),
            src_size = src.size(),
            dest = %to.name(),
            dest_size = dst.size(),
            "metadata sizes do not match, cannot copy"
        );
        return;
    }

    // Container locks are taken one at a time; the buffer locks already
    // serialize copies over the same pair.
    let bytes = src.lock().clone();
    dst.lock().copy_from_slice(&bytes);
}

/// Exchange the backing storage of two slots in different buffers.
///
/// The caller guarantees, as a setup-time fact, that `from` has exactly
/// one consumer and `to` exactly one producer, and that the caller holds
/// both frames. Both buffers must have the same aligned frame size.
pub fn swap_frames(
    from: &FrameBuffer,
    from_slot: usize,
    to: &FrameBuffer,
    to_slot: usize,
) -> Result<()> {
    check_slot(from, from_slot);
    check_slot(to, to_slot);

    if from.aligned_frame_size() != to.aligned_frame_size() {
        return Err(Error::SizeMismatch {
            src: from.name().into(),
            src_size: from.aligned_frame_size(),
            dest: to.name().into(),
            dest_size: to.aligned_frame_size(),
        });
    }
    single_role(from, "consumer", from.consumer_count())?;
    single_role(to, "producer", to.producer_count())?;

    let (mut from_state, mut to_state) = lock_pair(from, to);
    std::mem::swap(
        &mut from_state.frames[from_slot],
        &mut to_state.frames[to_slot],
    );
    Ok(())
}

/// Move a frame from `src` to `dest`, swapping when that is safe and
/// copying when it is not.
///
/// With one consumer on `src` the storage is exchanged; with more than one
/// the payload is copied so the other consumers still see it. `dest` must
/// have exactly one producer and both buffers the same frame size.
pub fn safe_swap_frame(
    src: &FrameBuffer,
    src_slot: usize,
    dest: &FrameBuffer,
    dest_slot: usize,
) -> Result<()> {
    check_slot(src, src_slot);
    check_slot(dest, dest_slot);

    if src.frame_size() != dest.frame_size() {
        return Err(Error::SizeMismatch {
            src: src.name().into(),
            src_size: src.frame_size(),
            dest: dest.name().into(),
            dest_size: dest.frame_size(),
        });
    }
    single_role(dest, "producer", dest.producer_count())?;

    let consumers = src.consumer_count();
    let (mut src_state, mut dest_state) = lock_pair(src, dest);
    if consumers == 1 {
        std::mem::swap(
            &mut src_state.frames[src_slot],
            &mut dest_state.frames[dest_slot],
        );
    } else if consumers > 1 {
        let n = src.frame_size();
        let payload = &src_state.frames[src_slot].as_slice()[..n];
        dest_state.frames[dest_slot].as_mut_slice()[..n].copy_from_slice(payload);
    }
    Ok(())
}

/// Substitute an externally-owned region for a slot's backing storage and
/// return the previous region.
///
/// This is the accelerator interop path: hand a frame's memory to a device
/// zero-copy and take its host buffer in exchange. The buffer must have
/// exactly one producer, and the external region must be at least a frame
/// long.
pub fn swap_external_frame(
    buf: &FrameBuffer,
    slot: usize,
    external: FrameRegion,
) -> Result<FrameRegion> {
    check_slot(buf, slot);
    assert!(
        external.len() >= buf.frame_size(),
        "external region ({} bytes) is smaller than a frame ({} bytes)",
        external.len(),
        buf.frame_size()
    );
    single_role(buf, "producer", buf.producer_count())?;

    let mut state = buf.inner.state.lock().unwrap();
    Ok(std::mem::replace(&mut state.frames[slot], external))
}

fn single_role(buf: &FrameBuffer, role: &'static str, count: usize) -> Result<()> {
    if count != 1 {
        return Err(Error::SingleRoleViolation {
            buffer: buf.name().into(),
            role,
            count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferConfig;
    use crate::metadata::MetadataPool;
    use std::ptr::NonNull;

    fn ring(name: &str) -> FrameBuffer {
        BufferConfig::new(name, 1024, 2).build().unwrap()
    }

    fn ring_with_pool(name: &str, pool: &MetadataPool) -> FrameBuffer {
        BufferConfig::new(name, 1024, 2)
            .with_metadata_pool(pool.clone())
            .build()
            .unwrap()
    }

    #[test]
    fn test_pass_metadata_shares_container() {
        let pool = MetadataPool::new(4, 32, "pass");
        let a = ring_with_pool("a", &pool);
        let b = ring_with_pool("b", &pool);

        a.allocate_new_metadata(0).unwrap();
        a.get_metadata(0).lock()[0] = 9;

        pass_metadata(&a, 0, &b, 1);
        assert!(a.get_metadata(0).same_container(&b.get_metadata(1)));
        assert_eq!(b.get_metadata(1).lock()[0], 9);
        // One container drawn, shared by two slots.
        assert_eq!(pool.available(), 3);

        // Idempotent.
        pass_metadata(&a, 0, &b, 1);
        assert_eq!(pool.available(), 3);
    }

    #[test]
    fn test_pass_metadata_keeps_container_alive_after_source_drains() {
        let pool = MetadataPool::new(2, 32, "alive");
        let a = ring_with_pool("src", &pool);
        let b = ring_with_pool("dst", &pool);
        a.register_producer("p").unwrap();
        a.register_consumer("c").unwrap();

        a.wait_for_empty("p", 0).unwrap();
        a.allocate_new_metadata(0).unwrap();
        a.mark_full("p", 0);

        a.wait_for_full("c", 0).unwrap();
        pass_metadata(&a, 0, &b, 0);
        a.mark_empty("c", 0);

        // The source slot released its reference; the destination's lives.
        assert!(a.get_metadata_container(0).is_none());
        let meta = b.get_metadata(0);
        assert!(meta.ref_count() >= 1);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn test_pass_metadata_without_source_is_noop() {
        let a = ring("bare_a");
        let b = ring("bare_b");
        pass_metadata(&a, 0, &b, 0);
        assert!(b.get_metadata_container(0).is_none());
    }

    #[test]
    #[should_panic(expected = "different metadata container")]
    fn test_pass_metadata_conflicting_binding_is_fatal() {
        let pool = MetadataPool::new(4, 32, "conflict");
        let a = ring_with_pool("ca", &pool);
        let b = ring_with_pool("cb", &pool);
        a.allocate_new_metadata(0).unwrap();
        b.allocate_new_metadata(0).unwrap();
        pass_metadata(&a, 0, &b, 0);
    }

    #[test]
    fn test_copy_metadata_is_value_copy() {
        let pool = MetadataPool::new(4, 32, "copy");
        let a = ring_with_pool("va", &pool);
        let b = ring_with_pool("vb", &pool);
        a.allocate_new_metadata(0).unwrap();
        b.allocate_new_metadata(0).unwrap();

        a.get_metadata(0).lock().fill(0x5A);
        let dst = b.get_metadata(0);
        let count_before = dst.ref_count();

        copy_metadata(&a, 0, &b, 0);

        assert!(dst.lock().iter().all(|&x| x == 0x5A));
        assert!(!a.get_metadata(0).same_container(&dst));
        assert_eq!(dst.ref_count(), count_before);
    }

    #[test]
    fn test_copy_metadata_size_mismatch_leaves_destination() {
        let small = MetadataPool::new(2, 16, "small");
        let large = MetadataPool::new(2, 64, "large");
        let a = ring_with_pool("ma", &small);
        let b = ring_with_pool("mb", &large);
        a.allocate_new_metadata(0).unwrap();
        b.allocate_new_metadata(0).unwrap();

        a.get_metadata(0).lock().fill(0xFF);
        copy_metadata(&a, 0, &b, 0);
        assert!(b.get_metadata(0).lock().iter().all(|&x| x == 0));
    }

    #[test]
    fn test_swap_frames_exchanges_storage() {
        let a = ring("swap_a");
        let b = ring("swap_b");
        a.register_producer("pa").unwrap();
        a.register_consumer("ca").unwrap();
        b.register_producer("pb").unwrap();
        b.register_consumer("cb").unwrap();

        let mut frame = a.wait_for_empty("pa", 0).unwrap();
        frame.as_mut_slice()[..3].copy_from_slice(b"abc");
        a.mark_full("pa", 0);
        a.wait_for_full("ca", 0).unwrap();

        let b_frame = b.wait_for_empty("pb", 0).unwrap();
        let b_ptr = b_frame.as_ptr();

        swap_frames(&a, 0, &b, 0).unwrap();

        // B's slot 0 now backs A's payload, and vice versa.
        let swapped = b.wait_for_empty("pb", 0).unwrap();
        assert_eq!(&swapped.as_slice()[..3], b"abc");
        assert_ne!(swapped.as_ptr(), b_ptr);

        // Swapping back restores both bindings.
        swap_frames(&a, 0, &b, 0).unwrap();
        let restored = b.wait_for_empty("pb", 0).unwrap();
        assert_eq!(restored.as_ptr(), b_ptr);
    }

    #[test]
    fn test_swap_frames_size_mismatch() {
        let a = ring("sz_a");
        let b = BufferConfig::new("sz_b", 8192, 2).build().unwrap();
        a.register_consumer("ca").unwrap();
        b.register_producer("pb").unwrap();
        assert!(matches!(
            swap_frames(&a, 0, &b, 0),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_swap_frames_single_role_enforced() {
        let a = ring("sr_a");
        let b = ring("sr_b");
        a.register_consumer("c1").unwrap();
        a.register_consumer("c2").unwrap();
        b.register_producer("pb").unwrap();
        assert!(matches!(
            swap_frames(&a, 0, &b, 0),
            Err(Error::SingleRoleViolation { count: 2, .. })
        ));
    }

    #[test]
    fn test_safe_swap_copies_with_fan_out() {
        let src = ring("fan_src");
        let dest = ring("fan_dest");
        src.register_producer("p").unwrap();
        src.register_consumer("c1").unwrap();
        src.register_consumer("c2").unwrap();
        dest.register_producer("pd").unwrap();

        let mut frame = src.wait_for_empty("p", 0).unwrap();
        frame.as_mut_slice()[..3].copy_from_slice(b"xyz");
        let src_ptr = frame.as_ptr();
        src.mark_full("p", 0);

        safe_swap_frame(&src, 0, &dest, 0).unwrap();

        // Copied, not swapped: the source frame stays where it was.
        let still = src.wait_for_full("c1", 0).unwrap();
        assert_eq!(still.as_ptr(), src_ptr);
        assert_eq!(&still.as_slice()[..3], b"xyz");
        let copied = dest.wait_for_empty("pd", 0).unwrap();
        assert_eq!(&copied.as_slice()[..3], b"xyz");
    }

    #[test]
    fn test_safe_swap_swaps_with_single_consumer() {
        let src = ring("one_src");
        let dest = ring("one_dest");
        src.register_consumer("c").unwrap();
        dest.register_producer("p").unwrap();

        let before = dest.wait_for_empty("p", 0).unwrap().as_ptr();
        safe_swap_frame(&src, 0, &dest, 0).unwrap();
        let after = dest.wait_for_empty("p", 0).unwrap().as_ptr();
        assert_ne!(before, after);
    }

    #[test]
    fn test_swap_external_frame_round_trip() {
        let buf = ring("ext");
        buf.register_producer("p").unwrap();

        let mut backing = vec![0x77u8; 4096].into_boxed_slice();
        let external =
            unsafe { FrameRegion::from_raw(NonNull::new(backing.as_mut_ptr()).unwrap(), 4096) };

        let previous = swap_external_frame(&buf, 0, external).unwrap();
        assert!(!previous.is_external());

        // The slot now reads from the external memory.
        let frame = buf.wait_for_empty("p", 0).unwrap();
        assert!(frame.as_slice().iter().all(|&x| x == 0x77));

        // Hand the fabric's region back.
        let returned = swap_external_frame(&buf, 0, previous).unwrap();
        assert!(returned.is_external());
    }

    #[test]
    fn test_swap_external_requires_single_producer() {
        let buf = ring("ext_two");
        buf.register_producer("p1").unwrap();
        buf.register_producer("p2").unwrap();

        let mut backing = vec![0u8; 4096].into_boxed_slice();
        let external =
            unsafe { FrameRegion::from_raw(NonNull::new(backing.as_mut_ptr()).unwrap(), 4096) };
        assert!(matches!(
            swap_external_frame(&buf, 0, external),
            Err(Error::SingleRoleViolation { .. })
        ));
    }
}
