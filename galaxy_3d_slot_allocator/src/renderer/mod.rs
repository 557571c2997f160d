/// Renderer-facing module - GPU timeline bookkeeping

pub mod gpu_frame_tracker;

pub use gpu_frame_tracker::{FrameIndex, GpuFrameTracker, GpuSlotUser};
