//! # Fringe
//!
//! The frame-buffer fabric for a real-time radio-telescope back-end.
//!
//! Correlator and beamformer data arrives at a fixed cadence and cannot be
//! paused; per-frame payloads are tens of MB and must be shared zero-copy
//! between CPU stages and GPU kernels; several stages produce and consume
//! the same frame at once. Fringe provides the piece everything else
//! stands on: rings of fixed-size frame slots with a multi-producer /
//! multi-consumer handshake, pooled reference-counted metadata, zero-copy
//! frame swaps between rings, and a coordinated shutdown signal.
//!
//! ## Features
//!
//! - **Backpressure without silent loss**: producers block on empty slots,
//!   consumers on full ones; the only drop is the logged no-consumer path
//! - **Zero-copy**: stages exchange slot indices and swap storage between
//!   rings instead of copying payloads
//! - **Placement-aware allocation**: page-aligned, page-locked, optionally
//!   NUMA-bound frame memory
//! - **Deferred zeroing**: scrub-on-release happens off the buffer lock on
//!   a dedicated, pinnable worker
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use fringe::prelude::*;
//!
//! let pool = MetadataPool::new(16, 256, "vis_pool");
//! let buf = BufferConfig::new("gpu_input", 16 * 1024 * 1024, 4)
//!     .with_metadata_pool(pool)
//!     .with_numa_node(0)
//!     .build()?;
//!
//! buf.register_producer("net_capture")?;
//! buf.register_consumer("correlator")?;
//!
//! // Producer loop
//! let mut frame = buf.wait_for_empty("net_capture", 0).unwrap();
//! frame.as_mut_slice()[..4].copy_from_slice(b"data");
//! buf.allocate_new_metadata(0)?;
//! buf.mark_full("net_capture", 0);
//!
//! // Consumer loop
//! let frame = buf.wait_for_full("correlator", 0).unwrap();
//! assert_eq!(&frame.as_slice()[..4], b"data");
//! buf.mark_empty("correlator", 0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod buffer;
pub mod catalog;
pub mod error;
pub mod memory;
pub mod metadata;
pub mod transfer;

mod zeroing;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::{BufferConfig, FrameBuffer, FrameRef, TimedWait};
    pub use crate::catalog::BufferCatalog;
    pub use crate::error::{Error, Result};
    pub use crate::memory::FrameRegion;
    pub use crate::metadata::{MetadataPool, MetadataRef};
    pub use crate::transfer::{
        copy_metadata, pass_metadata, safe_swap_frame, swap_external_frame, swap_frames,
    };
}

pub use error::{Error, Result};
