//! Integration tests for UniformArena + GpuFrameTracker
//!
//! Simulates a render loop: per-object uniform blocks are allocated in the
//! arena, read by in-flight frames, retired when objects are destroyed and
//! reclaimed once the frames that read them complete. No GPU required.
//!
//! Run with: cargo test --test uniform_arena_integration_tests

use galaxy_3d_slot_allocator::galaxy3d::alloc::AllocationId;
use galaxy_3d_slot_allocator::galaxy3d::gpu::{FrameIndex, GpuFrameTracker};
use galaxy_3d_slot_allocator::galaxy3d::resource::{ArenaAllocation, UniformArena, UniformArenaDesc};
use galaxy_3d_slot_allocator::galaxy3d::Error;
use glam::{Mat4, Vec3};

/// Per-object uniform block (std140: mat4 + vec4)
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ObjectUniforms {
    world: Mat4,
    color: [f32; 4],
}

const OBJECT_UNIFORMS_SIZE: u32 = std::mem::size_of::<ObjectUniforms>() as u32;

fn arena() -> UniformArena {
    UniformArena::new(UniformArenaDesc {
        initial_size: 1024,
        slot_granularity: 256,
        growth_factor: 2,
        max_size: Some(16 * 1024),
    })
    .unwrap()
}

// ============================================================================
// RENDER LOOP TESTS
// ============================================================================

#[test]
fn test_integration_destroyed_object_reclaimed_after_frames_complete() {
    let mut arena = arena();
    let mut tracker = GpuFrameTracker::new();

    let ids: Vec<AllocationId> = (0..4)
        .map(|_| arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap().id())
        .collect();
    assert_eq!(arena.allocator().stats().free_bytes, 0);

    // Two frames in flight read every object
    let mut frames = Vec::new();
    for _ in 0..2 {
        frames.push(tracker.begin_frame());
        for &id in &ids {
            tracker.use_slot(&mut arena, id).unwrap();
        }
        tracker.end_frame();
    }

    // Object 1 is destroyed on the CPU while both frames are in flight
    arena.retire(ids[1]).unwrap();
    arena.release_free_slots();
    assert_eq!(arena.allocator().stats().pending_slot_count, 1);

    tracker.frame_completed(&mut arena, frames[0]).unwrap();
    assert_eq!(arena.allocator().stats().free_bytes, 0);

    tracker.frame_completed(&mut arena, frames[1]).unwrap();
    let stats = arena.allocator().stats();
    assert_eq!(stats.free_slot_count, 1);
    assert_eq!(stats.free_bytes, 256);

    // The reclaimed slot is reused without growing the buffer
    let reused = arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap();
    assert_eq!(reused, ArenaAllocation::Slot { id: ids[1], offset: 256 });
    assert_eq!(arena.generation(), 0);
}

#[test]
fn test_integration_write_uniform_block() {
    let mut arena = arena();
    let allocation = arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap();

    let uniforms = ObjectUniforms {
        world: Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)),
        color: [1.0, 0.5, 0.25, 1.0],
    };
    arena.write_value(allocation.id(), 0, &uniforms).unwrap();

    let bytes = arena.read(allocation.id()).unwrap();
    let stored: ObjectUniforms = bytemuck::pod_read_unaligned(&bytes[..OBJECT_UNIFORMS_SIZE as usize]);
    assert_eq!(stored.world, uniforms.world);
    assert_eq!(stored.color, uniforms.color);

    let offset = allocation.offset() as usize;
    assert_eq!(
        &arena.contents()[offset..offset + OBJECT_UNIFORMS_SIZE as usize],
        bytemuck::bytes_of(&uniforms)
    );
}

#[test]
fn test_integration_reallocation_restages_live_blocks() {
    let mut arena = arena();
    let mut tracker = GpuFrameTracker::new();

    let mut live: Vec<(AllocationId, Mat4)> = Vec::new();
    let mut generation_changes = 0;

    for i in 0..10 {
        let world = Mat4::from_scale(Vec3::splat(i as f32 + 1.0));
        match arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap() {
            ArenaAllocation::Slot { id, .. } => live.push((id, world)),
            ArenaAllocation::Reallocated { id, generation, .. } => {
                generation_changes += 1;
                assert_eq!(generation, arena.generation());
                tracker.clear();

                // Every earlier id is gone: re-allocate and re-stage them
                let previous = std::mem::take(&mut live);
                live.push((id, world));
                for (_, old_world) in previous {
                    let allocation = arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap();
                    assert!(!allocation.is_reallocated());
                    live.push((allocation.id(), old_world));
                }
            }
            ArenaAllocation::Unallocated => unreachable!(),
        }
        for &(id, world) in &live {
            arena.write_value(id, 0, &ObjectUniforms { world, color: [1.0; 4] }).unwrap();
        }
    }

    // 10 blocks of 256 bytes: 1024 -> 2048 -> 4096
    assert_eq!(generation_changes, 2);
    assert_eq!(arena.size(), 4096);
    assert_eq!(live.len(), 10);
    arena.allocator().check_invariants().unwrap();

    let mut scales: Vec<f32> = live.iter()
        .map(|&(id, _)| {
            let bytes = arena.read(id).unwrap();
            let stored: ObjectUniforms = bytemuck::pod_read_unaligned(&bytes[..OBJECT_UNIFORMS_SIZE as usize]);
            stored.world.x_axis.x
        })
        .collect();
    scales.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(scales, (1..=10).map(|i| i as f32).collect::<Vec<_>>());
}

/// Frame 0 reads the first block, then the arena grows while it is in flight
fn grow_with_frame_in_flight() -> (UniformArena, GpuFrameTracker, FrameIndex, AllocationId) {
    let mut arena = arena();
    let mut tracker = GpuFrameTracker::new();

    let first = arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap().id();
    for _ in 0..3 {
        arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap();
    }
    let frame = tracker.begin_frame();
    tracker.use_slot(&mut arena, first).unwrap();
    tracker.end_frame();

    // Growth restarts at offset 0, so the new block gets the same id
    let grown = arena.allocate(OBJECT_UNIFORMS_SIZE).unwrap();
    assert!(grown.is_reallocated());
    assert_eq!(grown.id(), first);

    (arena, tracker, frame, grown.id())
}

#[test]
fn test_integration_stale_frame_releases_hit_new_slots() {
    let (mut arena, mut tracker, frame, id) = grow_with_frame_in_flight();

    assert_eq!(
        tracker.frame_completed(&mut arena, frame),
        Err(Error::UnbalancedGpuRelease(id.raw()))
    );
    assert!(arena.allocator().slot_info(id).unwrap().is_allocated);
}

#[test]
fn test_integration_clear_after_growth_drops_stale_frames() {
    let (mut arena, mut tracker, frame, id) = grow_with_frame_in_flight();

    tracker.clear();
    assert_eq!(tracker.frames_in_flight(), 0);
    assert_eq!(tracker.frame_completed(&mut arena, frame), Ok(0));

    let info = arena.allocator().slot_info(id).unwrap();
    assert!(info.is_allocated);
    assert_eq!(info.gpu_use_count, 0);
}

#[test]
fn test_integration_arena_exhaustion() {
    let mut arena = UniformArena::new(UniformArenaDesc {
        initial_size: 512,
        slot_granularity: 256,
        growth_factor: 2,
        max_size: Some(1024),
    })
    .unwrap();

    arena.allocate(256).unwrap();
    arena.allocate(256).unwrap();
    assert!(arena.allocate(256).unwrap().is_reallocated());
    arena.allocate(256).unwrap();
    arena.allocate(256).unwrap();
    arena.allocate(256).unwrap();
    assert_eq!(arena.allocate(256), Err(Error::OutOfMemory));
}
