//! Shared configuration types for the vulkandemo engine.
//!
//! The engine never reads files or environment variables itself; callers
//! build an [`EngineConfig`] and pass it top-down at construction time.

pub mod config;
pub mod error;

pub use config::{EngineConfig, PresentModePreference};
pub use error::{Error, Result};

/// Engine-wide constants
pub mod constants {
    /// Default number of frames the CPU may record ahead of the GPU.
    pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
    /// Upper bound on frames in flight; more buys latency, not throughput.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 3;
}
