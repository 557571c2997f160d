//! Allocation utilities

pub mod slot_allocator;

pub use slot_allocator::{AllocationId, SlotAllocator, SlotAllocatorStats, SlotInfo};
