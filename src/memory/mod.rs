//! Frame memory management.
//!
//! This module provides the storage layer under the frame-buffer fabric:
//!
//! - [`FrameRegion`]: one frame's page-aligned (optionally page-locked,
//!   optionally NUMA-bound) backing storage
//! - [`numa`]: node probing, `mbind` of mapped regions, and CPU pinning
//!
//! # Example
//!
//! ```rust,ignore
//! use fringe::memory::FrameRegion;
//!
//! // 16MB frame on NUMA node 0, page-locked (default feature)
//! let region = FrameRegion::allocate(16 * 1024 * 1024, Some(0))?;
//! assert!(region.as_slice().iter().all(|&b| b == 0));
//! ```

mod frame;
pub mod numa;

pub use frame::FrameRegion;
