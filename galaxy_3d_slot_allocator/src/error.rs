//! Error types for the Galaxy3D slot allocator
//!
//! Every precondition violation detected by the allocator, the uniform
//! arena or the frame tracker is surfaced as one of these variants.
//! Capacity exhaustion on a plain `SlotAllocator` is NOT an error: it is
//! reported through `AllocationId::REALLOCATION_REQUIRED`.

use std::fmt;

/// Result type for Galaxy3D allocator operations
pub type Result<T> = std::result::Result<T, Error>;

/// Galaxy3D allocator errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad sizes or granularity at construction / reset
    InvalidConfiguration(String),

    /// Sentinel id, or an id that does not resolve to a slot boundary
    InvalidAllocationId(u32),

    /// Retire on a slot that is not currently allocated
    SlotNotAllocated(u32),

    /// GPU acquire on a slot that already went back to the free pool
    SlotIsFree(u32),

    /// GPU release with a use count already at zero
    UnbalancedGpuRelease(u32),

    /// Arena cannot grow past its configured maximum size
    OutOfMemory,

    /// Arena access that runs past the end of the slot
    WriteOutOfBounds {
        id: u32,
        offset: u32,
        len: usize,
        slot_length: u32,
    },

    /// GPU use recorded while no frame is being recorded
    FrameNotRecording,

    /// Internal bookkeeping no longer matches the slot invariants
    InvariantViolation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::InvalidAllocationId(id) => write!(f, "Invalid allocation id: {}", id),
            Error::SlotNotAllocated(id) => write!(f, "Slot {} is not allocated", id),
            Error::SlotIsFree(id) => write!(f, "Slot {} is free and cannot be used by the GPU", id),
            Error::UnbalancedGpuRelease(id) => {
                write!(f, "Unbalanced GPU release on slot {}: use count is already 0", id)
            }
            Error::OutOfMemory => write!(f, "Out of uniform buffer memory"),
            Error::WriteOutOfBounds { id, offset, len, slot_length } => write!(
                f,
                "Access of {} bytes at offset {} exceeds slot {} (length {})",
                len, offset, id, slot_length
            ),
            Error::FrameNotRecording => write!(f, "No GPU frame is being recorded"),
            Error::InvariantViolation(msg) => write!(f, "Slot invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ===== ERROR MACROS =====

/// Build an error, log it at ERROR severity with file:line, and evaluate to it
///
/// # Example
///
/// ```ignore
/// return Err(alloc_err!("galaxy3d::SlotAllocator", Error::InvalidAllocationId(id)));
/// ```
#[macro_export]
macro_rules! alloc_err {
    ($source:expr, $error:expr) => {{
        let error: $crate::galaxy3d::Error = $error;
        $crate::alloc_error!($source, "{}", error);
        error
    }};
}

/// Log an error and return it from the current function
///
/// # Example
///
/// ```ignore
/// alloc_bail!("galaxy3d::SlotAllocator", Error::SlotNotAllocated(id));
/// ```
#[macro_export]
macro_rules! alloc_bail {
    ($source:expr, $error:expr) => {
        return Err($crate::alloc_err!($source, $error))
    };
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
