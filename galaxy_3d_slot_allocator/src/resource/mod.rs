//! Resource module
//!
//! Owners of GPU-visible buffers built on top of the slot allocator.

pub mod uniform_arena;

pub use uniform_arena::{ArenaAllocation, UniformArena};
