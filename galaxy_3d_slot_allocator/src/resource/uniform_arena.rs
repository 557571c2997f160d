/// CPU-side owner of a growable uniform buffer.
///
/// A UniformArena pairs a SlotAllocator with a shadow copy of the buffer
/// contents. It is what reacts to `REALLOCATION_REQUIRED`: the arena grows
/// its backing size, resets the allocator and reports the new generation so
/// the caller can re-stage every live uniform block.
///
/// Growth policy:
/// - new size = max(size * growth_factor, size + aligned request)
/// - clamped to `max_size`; if that cannot hold the request -> `Error::OutOfMemory`

use bytemuck::Pod;
use crate::config::UniformArenaDesc;
use crate::error::{Error, Result};
use crate::renderer::GpuSlotUser;
use crate::utils::{AllocationId, SlotAllocator};
use crate::{alloc_bail, alloc_err, alloc_warn};

const SOURCE: &str = "galaxy3d::UniformArena";

// ===== ARENA ALLOCATION =====

/// Outcome of `UniformArena::allocate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArenaAllocation {
    /// Zero-byte request, nothing was allocated
    Unallocated,
    /// Allocated in the current buffer; all other ids remain valid
    Slot { id: AllocationId, offset: u32 },
    /// The buffer was grown and reset before allocating.
    /// Every id issued before this one is invalid, including those still
    /// recorded by a `GpuFrameTracker`: call `GpuFrameTracker::clear` before
    /// the next `frame_completed`, or its releases hit the new slots.
    Reallocated { id: AllocationId, offset: u32, generation: u64 },
}

impl ArenaAllocation {
    /// Allocation id (`UNALLOCATED` for zero-byte requests)
    pub fn id(&self) -> AllocationId {
        match *self {
            ArenaAllocation::Unallocated => AllocationId::UNALLOCATED,
            ArenaAllocation::Slot { id, .. } | ArenaAllocation::Reallocated { id, .. } => id,
        }
    }

    /// Byte offset in the backing buffer (0 for zero-byte requests)
    pub fn offset(&self) -> u32 {
        match *self {
            ArenaAllocation::Unallocated => 0,
            ArenaAllocation::Slot { offset, .. } | ArenaAllocation::Reallocated { offset, .. } => offset,
        }
    }

    /// Whether earlier ids were invalidated by this allocation
    pub fn is_reallocated(&self) -> bool {
        matches!(self, ArenaAllocation::Reallocated { .. })
    }
}

// ===== UNIFORM ARENA =====

pub struct UniformArena {
    desc: UniformArenaDesc,
    allocator: SlotAllocator,
    contents: Vec<u8>,
    generation: u64,
}

impl UniformArena {
    /// Create an arena with `desc.initial_size` zeroed bytes
    pub fn new(desc: UniformArenaDesc) -> Result<Self> {
        desc.validate()?;
        let allocator = SlotAllocator::new(desc.allocator_desc())?;
        Ok(Self {
            desc,
            allocator,
            contents: vec![0; desc.initial_size as usize],
            generation: 0,
        })
    }

    /// Allocate a uniform block, growing the buffer if no slot is large enough
    pub fn allocate(&mut self, size: u32) -> Result<ArenaAllocation> {
        match self.allocator.allocate(size) {
            (AllocationId::UNALLOCATED, _) => Ok(ArenaAllocation::Unallocated),
            (AllocationId::REALLOCATION_REQUIRED, _) => self.grow_and_allocate(size),
            (id, offset) => Ok(ArenaAllocation::Slot { id, offset }),
        }
    }

    fn grow_and_allocate(&mut self, size: u32) -> Result<ArenaAllocation> {
        let limit = self.desc.size_limit() as u64;
        let current = self.allocator.total_size() as u64;

        let Some(aligned) = self.allocator.aligned_size(size) else {
            alloc_bail!(SOURCE, Error::OutOfMemory);
        };
        if aligned as u64 > limit || current >= limit {
            alloc_bail!(SOURCE, Error::OutOfMemory);
        }

        // All terms are multiples of the granularity, so is the result
        let new_size = (current * self.desc.growth_factor as u64)
            .max(current + aligned as u64)
            .min(limit) as u32;

        self.allocator.reset(new_size)?;
        self.contents.resize(new_size as usize, 0);
        self.generation += 1;
        alloc_warn!(SOURCE, "uniform buffer grown {} -> {} bytes for a {}-byte request (generation {})",
            current, new_size, size, self.generation);

        match self.allocator.allocate(size) {
            (id, offset) if id.is_valid() => Ok(ArenaAllocation::Reallocated {
                id,
                offset,
                generation: self.generation,
            }),
            _ => Err(alloc_err!(SOURCE, Error::InvariantViolation(format!(
                "{}-byte request does not fit a fresh {}-byte buffer", size, new_size
            )))),
        }
    }

    /// Copy `bytes` into the slot at `offset_in_slot`
    pub fn write(&mut self, id: AllocationId, offset_in_slot: u32, bytes: &[u8]) -> Result<()> {
        let start = self.checked_range(id, offset_in_slot, bytes.len())?;
        self.contents[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Copy a plain-old-data value into the slot at `offset_in_slot`
    pub fn write_value<T: Pod>(&mut self, id: AllocationId, offset_in_slot: u32, value: &T) -> Result<()> {
        self.write(id, offset_in_slot, bytemuck::bytes_of(value))
    }

    /// Bytes of a live slot
    pub fn read(&self, id: AllocationId) -> Result<&[u8]> {
        let length = self.allocator.allocation_size(id)?;
        let start = self.checked_range(id, 0, length as usize)?;
        Ok(&self.contents[start..start + length as usize])
    }

    /// Absolute start of `[offset_in_slot, offset_in_slot + len)` within an allocated slot
    fn checked_range(&self, id: AllocationId, offset_in_slot: u32, len: usize) -> Result<usize> {
        let info = self.allocator.slot_info(id)?;
        if !info.is_allocated {
            alloc_bail!(SOURCE, Error::SlotNotAllocated(id.raw()));
        }
        if offset_in_slot as u64 + len as u64 > info.length as u64 {
            alloc_bail!(SOURCE, Error::WriteOutOfBounds {
                id: id.raw(),
                offset: offset_in_slot,
                len,
                slot_length: info.length,
            });
        }
        Ok(info.offset as usize + offset_in_slot as usize)
    }

    // ===== ALLOCATOR PASS-THROUGH =====

    /// See `SlotAllocator::retire`
    pub fn retire(&mut self, id: AllocationId) -> Result<()> {
        self.allocator.retire(id)
    }

    /// See `SlotAllocator::acquire_gpu`
    pub fn acquire_gpu(&mut self, id: AllocationId) -> Result<()> {
        self.allocator.acquire_gpu(id)
    }

    /// See `SlotAllocator::release_gpu`
    pub fn release_gpu(&mut self, id: AllocationId) -> Result<()> {
        self.allocator.release_gpu(id)
    }

    /// See `SlotAllocator::release_free_slots`
    pub fn release_free_slots(&mut self) -> usize {
        self.allocator.release_free_slots()
    }

    // ===== ACCESSORS =====

    /// Number of times the buffer was grown (0 for the initial buffer)
    pub fn generation(&self) -> u64 { self.generation }

    /// Current backing size in bytes
    pub fn size(&self) -> u32 { self.allocator.total_size() }

    /// Shadow contents, ready to upload to the GPU buffer
    pub fn contents(&self) -> &[u8] { &self.contents }

    /// Underlying allocator (read-only)
    pub fn allocator(&self) -> &SlotAllocator { &self.allocator }

    /// Descriptor this arena was created with
    pub fn desc(&self) -> &UniformArenaDesc { &self.desc }
}

impl GpuSlotUser for UniformArena {
    fn acquire_gpu(&mut self, id: AllocationId) -> Result<()> {
        UniformArena::acquire_gpu(self, id)
    }

    fn release_gpu(&mut self, id: AllocationId) -> Result<()> {
        UniformArena::release_gpu(self, id)
    }

    fn release_free_slots(&mut self) -> usize {
        UniformArena::release_free_slots(self)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "uniform_arena_tests.rs"]
mod tests;
