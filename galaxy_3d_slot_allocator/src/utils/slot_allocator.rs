/// Best-fit byte-range allocator over a fixed-size uniform buffer.
///
/// Hands out slots (contiguous byte ranges) of a linear buffer whose size
/// is fixed until the next `reset`. Every slot length is a multiple of the
/// slot granularity. Callers get an `AllocationId` instead of a raw offset.
///
/// Reclamation is two-phase:
/// - `retire` drops the CPU-side ownership of a slot
/// - `acquire_gpu` / `release_gpu` count the in-flight GPU reads
///
/// A slot rejoins the allocatable pool only once it is retired AND its GPU
/// use count is zero, and only when `release_free_slots` runs. That pass is
/// also the only place where adjacent free slots are merged.
///
/// Internally slots live in a `SlotMap` arena addressed by stable keys.
/// Three indices refer to them by key or offset:
/// - a doubly linked list (`prev` / `next`) in ascending offset order
/// - an offset index (`BTreeMap<offset, key>`)
/// - a free-length index (`BTreeSet<(length, offset)>`); best-fit is its
///   first entry at or above `(aligned_size, 0)`, so ties go to the lowest offset
///
/// # Example
///
/// ```ignore
/// let mut alloc = SlotAllocator::with_size(64, 16)?;
/// let (id, offset) = alloc.allocate(10);   // offset 0, slot length 16
/// alloc.acquire_gpu(id)?;                  // frame N reads it
/// alloc.retire(id)?;                       // CPU is done with it
/// alloc.release_gpu(id)?;                  // frame N retired on the GPU
/// alloc.release_free_slots();              // slot 0 is reusable again
/// ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use slotmap::{new_key_type, SlotMap};
use crate::config::{self, SlotAllocatorDesc};
use crate::error::{Error, Result};
use crate::{alloc_bail, alloc_debug, alloc_err, alloc_trace, alloc_warn};

const SOURCE: &str = "galaxy3d::SlotAllocator";

new_key_type! {
    /// Stable arena key of a slot record
    struct SlotKey;
}

// ===== ALLOCATION ID =====

/// Opaque handle to an allocated slot
///
/// Encodes `offset / slot_granularity + 1`, which keeps 0 free for
/// `UNALLOCATED`. Ids are only meaningful for the allocator that issued
/// them, and only until its next `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AllocationId(u32);

impl AllocationId {
    /// Returned for zero-byte requests
    pub const UNALLOCATED: AllocationId = AllocationId(0);

    /// Returned when no free slot is large enough; grow the buffer and `reset`
    pub const REALLOCATION_REQUIRED: AllocationId = AllocationId(u32::MAX);

    /// Wrap a raw id value (e.g. one that round-tripped through a GPU-side table)
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw id value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether this is a real slot handle rather than one of the two sentinels
    pub const fn is_valid(self) -> bool {
        self.0 != Self::UNALLOCATED.0 && self.0 != Self::REALLOCATION_REQUIRED.0
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            AllocationId::UNALLOCATED => write!(f, "UNALLOCATED"),
            AllocationId::REALLOCATION_REQUIRED => write!(f, "REALLOCATION_REQUIRED"),
            AllocationId(raw) => write!(f, "#{}", raw),
        }
    }
}

// ===== SLOT RECORD =====

#[derive(Debug, Clone)]
struct Slot {
    offset: u32,
    length: u32,
    is_allocated: bool,
    gpu_use_count: u32,
    /// Length under which this slot is stored in the free-length index
    free_length: Option<u32>,
    prev: Option<SlotKey>,
    next: Option<SlotKey>,
}

impl Slot {
    fn is_free(&self) -> bool {
        !self.is_allocated && self.gpu_use_count == 0
    }

    fn info(&self) -> SlotInfo {
        SlotInfo {
            offset: self.offset,
            length: self.length,
            is_allocated: self.is_allocated,
            gpu_use_count: self.gpu_use_count,
            in_free_pool: self.free_length.is_some(),
        }
    }
}

/// Read-only view of one slot, as yielded by `SlotAllocator::slots()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub offset: u32,
    pub length: u32,
    pub is_allocated: bool,
    pub gpu_use_count: u32,
    /// Whether the slot can currently be handed out by `allocate`
    pub in_free_pool: bool,
}

impl SlotInfo {
    /// Neither allocated nor read by the GPU
    pub fn is_free(&self) -> bool {
        !self.is_allocated && self.gpu_use_count == 0
    }
}

/// Occupancy summary returned by `SlotAllocator::stats()`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotAllocatorStats {
    pub slot_count: usize,
    /// Slots in the free pool (allocatable right now)
    pub free_slot_count: usize,
    pub free_bytes: u64,
    /// Slots still held by the CPU
    pub allocated_slot_count: usize,
    pub allocated_bytes: u64,
    /// Retired slots waiting for GPU release or the next coalescing pass
    pub pending_slot_count: usize,
    pub pending_bytes: u64,
    /// Slots with at least one outstanding GPU reference
    pub gpu_pinned_slot_count: usize,
    pub largest_free_slot: u32,
}

// ===== SLOT ALLOCATOR =====

pub struct SlotAllocator {
    slots: SlotMap<SlotKey, Slot>,
    by_offset: BTreeMap<u32, SlotKey>,
    free_by_length: BTreeSet<(u32, u32)>,
    head: Option<SlotKey>,
    total_size: u32,
    slot_granularity: u32,
}

impl SlotAllocator {
    /// Create an allocator with a single free slot spanning the whole buffer
    pub fn new(desc: SlotAllocatorDesc) -> Result<Self> {
        desc.validate()?;

        let mut allocator = Self {
            slots: SlotMap::with_key(),
            by_offset: BTreeMap::new(),
            free_by_length: BTreeSet::new(),
            head: None,
            total_size: desc.total_size,
            slot_granularity: desc.slot_granularity,
        };
        allocator.reinitialize(desc.total_size);
        Ok(allocator)
    }

    /// Shorthand for `new(SlotAllocatorDesc { total_size, slot_granularity })`
    pub fn with_size(total_size: u32, slot_granularity: u32) -> Result<Self> {
        Self::new(SlotAllocatorDesc { total_size, slot_granularity })
    }

    /// Discard every slot and start over with one free slot of `new_total_size`
    ///
    /// All previously issued ids become invalid. Nothing detects their
    /// later use beyond the usual lookup failures.
    pub fn reset(&mut self, new_total_size: u32) -> Result<()> {
        config::validate_total_size(new_total_size, self.slot_granularity)?;
        alloc_debug!(SOURCE, "reset: {} -> {} bytes ({} slots discarded)",
            self.total_size, new_total_size, self.slots.len());
        self.reinitialize(new_total_size);
        Ok(())
    }

    fn reinitialize(&mut self, total_size: u32) {
        self.slots.clear();
        self.by_offset.clear();
        self.free_by_length.clear();
        self.total_size = total_size;

        let key = self.slots.insert(Slot {
            offset: 0,
            length: total_size,
            is_allocated: false,
            gpu_use_count: 0,
            free_length: Some(total_size),
            prev: None,
            next: None,
        });
        self.by_offset.insert(0, key);
        self.free_by_length.insert((total_size, 0));
        self.head = Some(key);
    }

    /// Allocate `size` bytes (rounded up to the slot granularity)
    ///
    /// Returns `(UNALLOCATED, 0)` for a zero size and
    /// `(REALLOCATION_REQUIRED, 0)` when no free slot is large enough.
    /// Neither is an error.
    pub fn allocate(&mut self, size: u32) -> (AllocationId, u32) {
        if size == 0 {
            return (AllocationId::UNALLOCATED, 0);
        }

        let best_fit = self.aligned_size(size).and_then(|aligned| {
            self.free_by_length
                .range((aligned, 0)..)
                .next()
                .map(|&(length, offset)| (aligned, length, offset))
        });

        let Some((aligned, length, offset)) = best_fit else {
            alloc_warn!(SOURCE, "allocate({}): no free slot large enough in {} bytes, reallocation required",
                size, self.total_size);
            return (AllocationId::REALLOCATION_REQUIRED, 0);
        };

        self.free_by_length.remove(&(length, offset));
        let key = self.by_offset[&offset];
        {
            let slot = &mut self.slots[key];
            slot.is_allocated = true;
            slot.free_length = None;
        }

        if length > aligned {
            self.split(key, aligned);
        }

        let id = self.id_for_offset(offset);
        alloc_trace!(SOURCE, "allocate({}) -> {} at offset {} (slot length {})", size, id, offset, aligned);
        (id, offset)
    }

    /// Shrink `key` to `length` and insert the remainder as a free slot right after it
    fn split(&mut self, key: SlotKey, length: u32) {
        let (offset, remainder, old_next) = {
            let slot = &self.slots[key];
            (slot.offset + length, slot.length - length, slot.next)
        };

        let remainder_key = self.slots.insert(Slot {
            offset,
            length: remainder,
            is_allocated: false,
            gpu_use_count: 0,
            free_length: Some(remainder),
            prev: Some(key),
            next: old_next,
        });

        if let Some(next) = old_next {
            self.slots[next].prev = Some(remainder_key);
        }
        let slot = &mut self.slots[key];
        slot.length = length;
        slot.next = Some(remainder_key);

        self.by_offset.insert(offset, remainder_key);
        self.free_by_length.insert((remainder, offset));
    }

    /// Mark the slot as no longer used by the CPU
    ///
    /// The slot is NOT reusable until its GPU use count is zero and
    /// `release_free_slots` has run.
    pub fn retire(&mut self, id: AllocationId) -> Result<()> {
        let key = self.lookup(id)?;
        let slot = &mut self.slots[key];
        if !slot.is_allocated {
            alloc_bail!(SOURCE, Error::SlotNotAllocated(id.raw()));
        }
        slot.is_allocated = false;
        alloc_trace!(SOURCE, "retire({}) at offset {} (gpu uses: {})", id, slot.offset, slot.gpu_use_count);
        Ok(())
    }

    /// Record one more in-flight GPU reference to the slot
    pub fn acquire_gpu(&mut self, id: AllocationId) -> Result<()> {
        let key = self.lookup(id)?;
        let slot = &mut self.slots[key];
        if slot.free_length.is_some() {
            alloc_bail!(SOURCE, Error::SlotIsFree(id.raw()));
        }
        slot.gpu_use_count += 1;
        alloc_trace!(SOURCE, "acquire_gpu({}) -> {} uses", id, slot.gpu_use_count);
        Ok(())
    }

    /// Drop one in-flight GPU reference to the slot
    pub fn release_gpu(&mut self, id: AllocationId) -> Result<()> {
        let key = self.lookup(id)?;
        let slot = &mut self.slots[key];
        if slot.gpu_use_count == 0 {
            alloc_bail!(SOURCE, Error::UnbalancedGpuRelease(id.raw()));
        }
        slot.gpu_use_count -= 1;
        alloc_trace!(SOURCE, "release_gpu({}) -> {} uses", id, slot.gpu_use_count);
        Ok(())
    }

    /// Return every free slot to the pool, merging runs of adjacent free slots
    ///
    /// Single pass in offset order. Returns the number of slot records
    /// erased by merging. A second call without intervening mutation is a no-op.
    pub fn release_free_slots(&mut self) -> usize {
        let mut merged = 0;
        let mut returned = 0;
        let mut cursor = self.head;

        while let Some(key) = cursor {
            if !self.slots[key].is_free() {
                cursor = self.slots[key].next;
                continue;
            }

            // Absorb every free successor into `key`
            while let Some(next_key) = self.slots[key].next {
                if !self.slots[next_key].is_free() {
                    break;
                }
                let Some(next) = self.slots.remove(next_key) else {
                    break;
                };
                self.by_offset.remove(&next.offset);
                if let Some(length) = next.free_length {
                    self.free_by_length.remove(&(length, next.offset));
                }
                if let Some(after) = next.next {
                    self.slots[after].prev = Some(key);
                }
                let slot = &mut self.slots[key];
                slot.length += next.length;
                slot.next = next.next;
                merged += 1;
            }

            let slot = &mut self.slots[key];
            if slot.free_length != Some(slot.length) {
                if let Some(stale) = slot.free_length {
                    self.free_by_length.remove(&(stale, slot.offset));
                }
                slot.free_length = Some(slot.length);
                self.free_by_length.insert((slot.length, slot.offset));
                returned += 1;
            }
            cursor = slot.next;
        }

        if merged > 0 || returned > 0 {
            alloc_debug!(SOURCE, "release_free_slots: {} slots returned to the pool, {} merged away",
                returned, merged);
        }
        merged
    }

    /// Byte offset encoded in `id` (pure arithmetic, no slot lookup)
    pub fn allocation_offset(&self, id: AllocationId) -> Result<u32> {
        if !id.is_valid() {
            alloc_bail!(SOURCE, Error::InvalidAllocationId(id.raw()));
        }
        let offset = (id.raw() as u64 - 1) * self.slot_granularity as u64;
        if offset >= self.total_size as u64 {
            alloc_bail!(SOURCE, Error::InvalidAllocationId(id.raw()));
        }
        Ok(offset as u32)
    }

    /// Length of the slot behind a live id
    pub fn allocation_size(&self, id: AllocationId) -> Result<u32> {
        Ok(self.slot_info(id)?.length)
    }

    /// State of the slot behind a live id
    pub fn slot_info(&self, id: AllocationId) -> Result<SlotInfo> {
        let key = self.lookup(id)?;
        Ok(self.slots[key].info())
    }

    /// Resolve an id to its slot record
    fn lookup(&self, id: AllocationId) -> Result<SlotKey> {
        let offset = self.allocation_offset(id)?;
        self.by_offset
            .get(&offset)
            .copied()
            .ok_or_else(|| alloc_err!(SOURCE, Error::InvalidAllocationId(id.raw())))
    }

    fn id_for_offset(&self, offset: u32) -> AllocationId {
        AllocationId(offset / self.slot_granularity + 1)
    }

    // ===== ACCESSORS =====

    /// Configured buffer size in bytes
    pub fn total_size(&self) -> u32 { self.total_size }

    /// Slot granularity in bytes
    pub fn slot_granularity(&self) -> u32 { self.slot_granularity }

    /// Number of slot records (allocated, pending and free)
    pub fn slot_count(&self) -> usize { self.slots.len() }

    /// `size` rounded up to the slot granularity, `None` if that overflows
    pub fn aligned_size(&self, size: u32) -> Option<u32> {
        let mask = self.slot_granularity - 1;
        size.checked_add(mask).map(|padded| padded & !mask)
    }

    /// Iterate over all slots in ascending offset order
    pub fn slots(&self) -> impl Iterator<Item = SlotInfo> + '_ {
        std::iter::successors(self.head, move |&key| self.slots[key].next)
            .map(move |key| self.slots[key].info())
    }

    /// Occupancy summary
    pub fn stats(&self) -> SlotAllocatorStats {
        let mut stats = SlotAllocatorStats::default();
        for slot in self.slots() {
            stats.slot_count += 1;
            if slot.gpu_use_count > 0 {
                stats.gpu_pinned_slot_count += 1;
            }
            if slot.in_free_pool {
                stats.free_slot_count += 1;
                stats.free_bytes += slot.length as u64;
                stats.largest_free_slot = stats.largest_free_slot.max(slot.length);
            } else if slot.is_allocated {
                stats.allocated_slot_count += 1;
                stats.allocated_bytes += slot.length as u64;
            } else {
                stats.pending_slot_count += 1;
                stats.pending_bytes += slot.length as u64;
            }
        }
        stats
    }

    /// Verify that all three indices agree with each other and with the slot invariants
    pub fn check_invariants(&self) -> Result<()> {
        fn violation(msg: String) -> Result<()> {
            Err(Error::InvariantViolation(msg))
        }

        let mut expected_offset: u64 = 0;
        let mut prev: Option<SlotKey> = None;
        let mut visited = 0usize;
        let mut cursor = self.head;

        while let Some(key) = cursor {
            let Some(slot) = self.slots.get(key) else {
                return violation(format!("dangling slot link after offset {}", expected_offset));
            };
            if slot.prev != prev {
                return violation(format!("broken back link at offset {}", slot.offset));
            }
            if slot.offset as u64 != expected_offset {
                return violation(format!("slot at offset {} expected at {}", slot.offset, expected_offset));
            }
            if slot.length == 0 || slot.length % self.slot_granularity != 0 {
                return violation(format!("slot at offset {} has length {}", slot.offset, slot.length));
            }
            if self.by_offset.get(&slot.offset) != Some(&key) {
                return violation(format!("offset index does not map {} to its slot", slot.offset));
            }
            if let Some(length) = slot.free_length {
                if length != slot.length || !self.free_by_length.contains(&(length, slot.offset)) {
                    return violation(format!("stale free-length entry for offset {}", slot.offset));
                }
                if slot.is_allocated || slot.gpu_use_count > 0 {
                    return violation(format!("slot at offset {} is in the free pool while in use", slot.offset));
                }
            }

            expected_offset += slot.length as u64;
            visited += 1;
            prev = Some(key);
            cursor = slot.next;
        }

        if expected_offset != self.total_size as u64 {
            return violation(format!("slot lengths sum to {}, expected {}", expected_offset, self.total_size));
        }
        if visited != self.slots.len() || visited != self.by_offset.len() {
            return violation(format!("{} linked slots, {} records, {} offset entries",
                visited, self.slots.len(), self.by_offset.len()));
        }
        let indexed = self.slots.values().filter(|slot| slot.free_length.is_some()).count();
        if indexed != self.free_by_length.len() {
            return violation(format!("{} free slots but {} free-length entries", indexed, self.free_by_length.len()));
        }
        Ok(())
    }
}

impl fmt::Debug for SlotAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAllocator")
            .field("total_size", &self.total_size)
            .field("slot_granularity", &self.slot_granularity)
            .field("slots", &self.slots().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
