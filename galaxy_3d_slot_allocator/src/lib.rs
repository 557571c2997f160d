/*!
# Galaxy 3D Slot Allocator

Uniform buffer sub-allocation for the Galaxy3D rendering engine.

A fixed-size GPU-visible buffer is carved into slots with a best-fit free
list. Reclamation is deferred: a slot returns to the pool only once the CPU
has retired it AND no in-flight GPU frame still reads it, and only when the
owner runs a coalescing pass (typically once per frame).

## Architecture

- **SlotAllocator**: best-fit allocator with split/coalesce and two-phase retirement
- **UniformArena**: owner of the backing bytes; grows and resets on exhaustion
- **GpuFrameTracker**: per-frame GPU references, released when a frame completes
- **Logger**: pluggable, severity-filtered logging used by all of the above

The allocator is single-threaded: callers provide external synchronization.
*/

// Internal modules
mod error;
mod config;
pub mod log;
pub mod utils;
pub mod resource;
pub mod renderer;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging sub-module (types and control functions, NOT macros)
    pub mod log {
        pub use crate::log::{
            Logger, LogEntry, LogSeverity, DefaultLogger,
            set_logger, reset_logger, set_min_severity, min_severity,
        };
    }

    // Slot allocation sub-module
    pub mod alloc {
        pub use crate::config::SlotAllocatorDesc;
        pub use crate::utils::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::config::{
            UniformArenaDesc,
            DEFAULT_GROWTH_FACTOR, DEFAULT_UNIFORM_ARENA_SIZE, DEFAULT_UNIFORM_GRANULARITY,
        };
        pub use crate::resource::*;
    }

    // GPU timeline sub-module
    pub mod gpu {
        pub use crate::renderer::*;
    }
}
