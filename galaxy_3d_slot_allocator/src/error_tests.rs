//! Unit tests for error.rs
//!
//! Tests all Error variants and their implementations (Display, Debug, Clone, std::error::Error).

use crate::error::{Error, Result};

// ============================================================================
// ERROR DISPLAY TESTS
// ============================================================================

#[test]
fn test_invalid_configuration_display() {
    let err = Error::InvalidConfiguration("granularity 24 is not a power of two".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Invalid configuration"));
    assert!(display.contains("granularity 24"));
}

#[test]
fn test_invalid_allocation_id_display() {
    let err = Error::InvalidAllocationId(42);
    assert_eq!(format!("{}", err), "Invalid allocation id: 42");
}

#[test]
fn test_slot_state_errors_display() {
    assert_eq!(format!("{}", Error::SlotNotAllocated(3)), "Slot 3 is not allocated");
    assert!(format!("{}", Error::SlotIsFree(5)).contains("Slot 5 is free"));
    assert!(format!("{}", Error::UnbalancedGpuRelease(7)).contains("use count is already 0"));
}

#[test]
fn test_out_of_memory_display() {
    assert_eq!(format!("{}", Error::OutOfMemory), "Out of uniform buffer memory");
}

#[test]
fn test_write_out_of_bounds_display() {
    let err = Error::WriteOutOfBounds { id: 2, offset: 250, len: 16, slot_length: 256 };
    let display = format!("{}", err);
    assert!(display.contains("16 bytes"));
    assert!(display.contains("offset 250"));
    assert!(display.contains("length 256"));
}

#[test]
fn test_frame_not_recording_display() {
    assert_eq!(format!("{}", Error::FrameNotRecording), "No GPU frame is being recorded");
}

#[test]
fn test_invariant_violation_display() {
    let err = Error::InvariantViolation("slot lengths sum to 48, expected 64".to_string());
    let display = format!("{}", err);
    assert!(display.contains("Slot invariant violated"));
    assert!(display.contains("expected 64"));
}

// ============================================================================
// ERROR TRAIT IMPLEMENTATIONS
// ============================================================================

#[test]
fn test_error_is_std_error() {
    let err = Error::OutOfMemory;
    let _: &dyn std::error::Error = &err;
}

#[test]
fn test_error_debug() {
    assert!(format!("{:?}", Error::InvalidAllocationId(1)).contains("InvalidAllocationId"));
    assert!(format!("{:?}", Error::UnbalancedGpuRelease(1)).contains("UnbalancedGpuRelease"));
}

#[test]
fn test_error_clone_and_eq() {
    let err1 = Error::InvalidConfiguration("size".to_string());
    let err2 = err1.clone();
    assert_eq!(err1, err2);
    assert_ne!(err1, Error::OutOfMemory);
}

// ============================================================================
// MACRO TESTS
// ============================================================================

#[test]
fn test_alloc_err_evaluates_to_error() {
    let err = crate::alloc_err!("galaxy3d::test", Error::SlotIsFree(9));
    assert_eq!(err, Error::SlotIsFree(9));
}

#[test]
fn test_alloc_bail_returns_early() {
    fn bails(id: u32) -> Result<u32> {
        if id == 0 {
            crate::alloc_bail!("galaxy3d::test", Error::InvalidAllocationId(id));
        }
        Ok(id)
    }

    assert_eq!(bails(0), Err(Error::InvalidAllocationId(0)));
    assert_eq!(bails(4), Ok(4));
}

#[test]
fn test_error_propagation_with_question_mark() {
    fn inner() -> Result<i32> {
        Err(Error::OutOfMemory)
    }

    fn outer() -> Result<i32> {
        inner()?;
        Ok(42)
    }

    assert_eq!(outer(), Err(Error::OutOfMemory));
}
