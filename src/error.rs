//! Error types for fringe.

use thiserror::Error;

/// Result type alias using fringe's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fringe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Frame memory allocation failed.
    #[error("frame allocation failed: {0}")]
    AllocationFailed(String),

    /// Page-locking the frame memory failed.
    #[error(
        "page-locking failed: {0}; check the RLIMIT_MEMLOCK resource limit (`ulimit -l`) \
         or build without the `memlock` feature"
    )]
    MemoryLockFailed(rustix::io::Errno),

    /// The requested NUMA node does not exist on this system.
    #[error("NUMA node {0} is not present on this system")]
    InvalidNumaNode(u32),

    /// The buffer's producer or consumer table has no free rows.
    #[error("role table full: buffer `{buffer}` cannot register another {role}")]
    RoleTableFull {
        /// Name of the buffer.
        buffer: String,
        /// Which table overflowed ("producer" or "consumer").
        role: &'static str,
    },

    /// A role with this name is already registered on the buffer.
    #[error("a {role} named `{name}` is already registered on buffer `{buffer}`")]
    DuplicateRole {
        /// Name of the buffer.
        buffer: String,
        /// Which table the registration targeted.
        role: &'static str,
        /// The offending stage name.
        name: String,
    },

    /// No role with this name is registered on the buffer.
    #[error("no {role} named `{name}` is registered on buffer `{buffer}`")]
    UnknownRole {
        /// Name of the buffer.
        buffer: String,
        /// Which table was searched.
        role: &'static str,
        /// The stage name that was not found.
        name: String,
    },

    /// Two buffers disagree on frame size where they must match.
    #[error(
        "frame sizes do not match: `{src}` has {src_size} byte frames, \
         `{dest}` has {dest_size} byte frames"
    )]
    SizeMismatch {
        /// Source buffer name.
        src: String,
        /// Source frame size in bytes.
        src_size: usize,
        /// Destination buffer name.
        dest: String,
        /// Destination frame size in bytes.
        dest_size: usize,
    },

    /// An operation that requires exactly one producer or consumer found
    /// a different count.
    #[error("buffer `{buffer}` must have exactly one {role} for this operation, found {count}")]
    SingleRoleViolation {
        /// Name of the buffer.
        buffer: String,
        /// Which role is constrained.
        role: &'static str,
        /// The count that was found.
        count: usize,
    },

    /// The metadata pool has no free containers.
    #[error("metadata pool `{0}` is exhausted; increase its capacity")]
    MetadataPoolExhausted(String),

    /// A producer requested metadata on a buffer with no pool attached.
    #[error("buffer `{0}` has no metadata pool but a producer requested metadata")]
    NoMetadataPool(String),

    /// A buffer with this name is already in the catalog.
    #[error("a buffer named `{0}` is already in the catalog")]
    DuplicateBuffer(String),

    /// System call error (via rustix).
    #[error("system error: {0}")]
    System(#[from] rustix::io::Errno),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
