/// Configuration descriptors for the slot allocator and the uniform arena.
///
/// Both descriptors are plain data validated on construction (and, for the
/// allocator, again on every reset). Validation failures are reported as
/// `Error::InvalidConfiguration` and logged at ERROR severity.

use crate::error::{Error, Result};
use crate::alloc_bail;

/// Default slot granularity for uniform buffers (common minUniformBufferOffsetAlignment)
pub const DEFAULT_UNIFORM_GRANULARITY: u32 = 256;

/// Default initial uniform arena size (64 KiB)
pub const DEFAULT_UNIFORM_ARENA_SIZE: u32 = 64 * 1024;

/// Default arena growth factor on capacity exhaustion
pub const DEFAULT_GROWTH_FACTOR: u32 = 2;

// ===== SLOT ALLOCATOR DESC =====

/// Descriptor for creating a SlotAllocator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotAllocatorDesc {
    /// Size of the backing buffer in bytes (multiple of `slot_granularity`)
    pub total_size: u32,
    /// Power-of-two unit every slot length is rounded to
    pub slot_granularity: u32,
}

impl SlotAllocatorDesc {
    /// Check the granularity and size rules
    pub fn validate(&self) -> Result<()> {
        validate_granularity(self.slot_granularity)?;
        validate_total_size(self.total_size, self.slot_granularity)
    }
}

// ===== UNIFORM ARENA DESC =====

/// Descriptor for creating a UniformArena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformArenaDesc {
    /// Initial backing size in bytes
    pub initial_size: u32,
    /// Slot granularity forwarded to the allocator
    pub slot_granularity: u32,
    /// Multiplier applied to the current size when the arena must grow (>= 2)
    pub growth_factor: u32,
    /// Hard upper bound on the backing size, `None` for unbounded (u32 range)
    pub max_size: Option<u32>,
}

impl Default for UniformArenaDesc {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_UNIFORM_ARENA_SIZE,
            slot_granularity: DEFAULT_UNIFORM_GRANULARITY,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            max_size: None,
        }
    }
}

impl UniformArenaDesc {
    /// Check the allocator rules plus growth settings
    pub fn validate(&self) -> Result<()> {
        self.allocator_desc().validate()?;

        if self.growth_factor < 2 {
            alloc_bail!("galaxy3d::UniformArenaDesc", Error::InvalidConfiguration(format!(
                "growth factor must be at least 2, got {}", self.growth_factor
            )));
        }

        if let Some(max_size) = self.max_size {
            if max_size < self.initial_size {
                alloc_bail!("galaxy3d::UniformArenaDesc", Error::InvalidConfiguration(format!(
                    "max size {} is smaller than initial size {}", max_size, self.initial_size
                )));
            }
            validate_total_size(max_size, self.slot_granularity)?;
        }

        Ok(())
    }

    /// Allocator descriptor for the initial backing size
    pub fn allocator_desc(&self) -> SlotAllocatorDesc {
        SlotAllocatorDesc {
            total_size: self.initial_size,
            slot_granularity: self.slot_granularity,
        }
    }

    /// Largest size the arena may grow to
    ///
    /// Without `max_size` this is the largest aligned size whose slot count
    /// stays below the id ceiling, so growth never produces an invalid allocator.
    pub fn size_limit(&self) -> u32 {
        let unbounded = (u32::MAX - 1) & !(self.slot_granularity.max(1) - 1);
        self.max_size.unwrap_or(unbounded)
    }
}

// ===== VALIDATION HELPERS =====

pub(crate) fn validate_granularity(slot_granularity: u32) -> Result<()> {
    if slot_granularity == 0 || !slot_granularity.is_power_of_two() {
        alloc_bail!("galaxy3d::SlotAllocator", Error::InvalidConfiguration(format!(
            "slot granularity must be a non-zero power of two, got {}", slot_granularity
        )));
    }
    Ok(())
}

pub(crate) fn validate_total_size(total_size: u32, slot_granularity: u32) -> Result<()> {
    if total_size == 0 {
        alloc_bail!("galaxy3d::SlotAllocator", Error::InvalidConfiguration(
            "total size must be greater than 0".to_string()
        ));
    }
    if total_size % slot_granularity != 0 {
        alloc_bail!("galaxy3d::SlotAllocator", Error::InvalidConfiguration(format!(
            "total size {} is not a multiple of slot granularity {}", total_size, slot_granularity
        )));
    }
    // Ids are offset / granularity + 1; the highest one must stay below REALLOCATION_REQUIRED
    if total_size / slot_granularity >= u32::MAX {
        alloc_bail!("galaxy3d::SlotAllocator", Error::InvalidConfiguration(format!(
            "total size {} has too many slots for granularity {}", total_size, slot_granularity
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
