/// Per-frame GPU reference bookkeeping for slot allocators.
///
/// Stands in for fence tracking: every frame gets a monotonically increasing
/// FrameIndex, slots read by a frame are acquired once for that frame, and
/// when the GPU reports a frame as completed every reference it held
/// (and those of all older frames) is released, followed by a coalescing pass.
///
/// # Example
///
/// ```ignore
/// let frame = tracker.begin_frame();
/// tracker.use_slot(&mut arena, material_ubo)?;
/// tracker.use_slot(&mut arena, object_ubo)?;
/// tracker.end_frame();
/// // ... later, once the fence for `frame` signalled
/// tracker.frame_completed(&mut arena, frame)?;
/// ```

use std::collections::VecDeque;
use rustc_hash::FxHashSet;
use crate::error::{Error, Result};
use crate::utils::{AllocationId, SlotAllocator};
use crate::{alloc_bail, alloc_debug};

const SOURCE: &str = "galaxy3d::GpuFrameTracker";

// ===== GPU SLOT USER =====

/// Anything that counts GPU references on allocation ids
pub trait GpuSlotUser {
    fn acquire_gpu(&mut self, id: AllocationId) -> Result<()>;
    fn release_gpu(&mut self, id: AllocationId) -> Result<()>;
    fn release_free_slots(&mut self) -> usize;
}

impl GpuSlotUser for SlotAllocator {
    fn acquire_gpu(&mut self, id: AllocationId) -> Result<()> {
        SlotAllocator::acquire_gpu(self, id)
    }

    fn release_gpu(&mut self, id: AllocationId) -> Result<()> {
        SlotAllocator::release_gpu(self, id)
    }

    fn release_free_slots(&mut self) -> usize {
        SlotAllocator::release_free_slots(self)
    }
}

// ===== FRAME INDEX =====

/// Monotonic identifier of a recorded frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameIndex(u64);

impl FrameIndex {
    pub fn value(&self) -> u64 { self.0 }
}

/// Slots referenced by one frame, in first-use order
#[derive(Debug)]
struct FrameRecord {
    index: FrameIndex,
    slots: Vec<AllocationId>,
    seen: FxHashSet<AllocationId>,
}

impl FrameRecord {
    fn new(index: FrameIndex) -> Self {
        Self {
            index,
            slots: Vec::new(),
            seen: FxHashSet::default(),
        }
    }
}

// ===== GPU FRAME TRACKER =====

#[derive(Debug, Default)]
pub struct GpuFrameTracker {
    /// Frame currently being recorded
    recording: Option<FrameRecord>,
    /// Submitted frames, oldest first
    in_flight: VecDeque<FrameRecord>,
    next_index: u64,
    last_completed: Option<FrameIndex>,
}

impl GpuFrameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording a new frame
    ///
    /// A frame still being recorded is submitted first, as if `end_frame` had been called.
    pub fn begin_frame(&mut self) -> FrameIndex {
        if let Some(open) = self.end_frame() {
            alloc_debug!(SOURCE, "frame {} was still recording, submitted implicitly", open.0);
        }
        let index = FrameIndex(self.next_index);
        self.next_index += 1;
        self.recording = Some(FrameRecord::new(index));
        index
    }

    /// Record that the current frame reads `id`
    ///
    /// The first use of an id within a frame acquires one GPU reference;
    /// repeated uses within the same frame are free. `UNALLOCATED` is ignored.
    pub fn use_slot<U: GpuSlotUser + ?Sized>(&mut self, user: &mut U, id: AllocationId) -> Result<()> {
        let Some(frame) = self.recording.as_mut() else {
            alloc_bail!(SOURCE, Error::FrameNotRecording);
        };
        if id == AllocationId::UNALLOCATED || frame.seen.contains(&id) {
            return Ok(());
        }
        user.acquire_gpu(id)?;
        frame.seen.insert(id);
        frame.slots.push(id);
        Ok(())
    }

    /// Submit the frame being recorded; returns its index, if any
    pub fn end_frame(&mut self) -> Option<FrameIndex> {
        let frame = self.recording.take()?;
        let index = frame.index;
        self.in_flight.push_back(frame);
        Some(index)
    }

    /// The GPU finished `frame`: release its references and those of every older frame
    ///
    /// Ends with a coalescing pass on `user` when at least one frame retired.
    /// Returns the number of frames retired. Unknown or already completed
    /// frames are a no-op. If a release fails, the remaining references are
    /// still released and the first error is returned.
    pub fn frame_completed<U: GpuSlotUser + ?Sized>(&mut self, user: &mut U, frame: FrameIndex) -> Result<usize> {
        let mut completed = 0;
        let mut released = 0;
        let mut first_error = None;

        while self.in_flight.front().is_some_and(|oldest| oldest.index <= frame) {
            let Some(record) = self.in_flight.pop_front() else {
                break;
            };
            for id in record.slots {
                match user.release_gpu(id) {
                    Ok(()) => released += 1,
                    Err(error) => {
                        first_error.get_or_insert(error);
                    }
                }
            }
            self.last_completed = Some(record.index);
            completed += 1;
        }

        if completed == 0 {
            alloc_debug!(SOURCE, "frame {} completed: nothing in flight up to it", frame.0);
            return Ok(0);
        }

        let merged = user.release_free_slots();
        alloc_debug!(SOURCE, "frame {} completed: {} frames retired, {} GPU references released, {} slots merged",
            frame.0, completed, released, merged);

        match first_error {
            Some(error) => Err(error),
            None => Ok(completed),
        }
    }

    /// Drop all tracking without touching any allocator
    ///
    /// Used after the allocator was reset: the recorded ids are meaningless.
    pub fn clear(&mut self) {
        self.recording = None;
        self.in_flight.clear();
    }

    // ===== ACCESSORS =====

    /// Frame currently being recorded
    pub fn recording_frame(&self) -> Option<FrameIndex> {
        self.recording.as_ref().map(|frame| frame.index)
    }

    /// Number of submitted frames the GPU has not completed yet
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Most recent frame reported as completed
    pub fn last_completed(&self) -> Option<FrameIndex> {
        self.last_completed
    }

    /// GPU references currently held by in-flight and recording frames
    pub fn pending_references(&self) -> usize {
        self.in_flight.iter().chain(self.recording.iter()).map(|frame| frame.slots.len()).sum()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "gpu_frame_tracker_tests.rs"]
mod tests;
