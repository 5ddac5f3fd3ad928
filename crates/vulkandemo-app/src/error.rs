//! Errors surfaced by the application loop.

use thiserror::Error;
use vulkandemo_gpu::GpuError;

/// Errors escaping [`run_app`](crate::run_app).
///
/// Per-frame recoverable conditions (swapchain staleness, acquire
/// timeouts) are absorbed by the scheduler and never appear here.
#[derive(Error, Debug)]
pub enum RunError {
    /// GPU-side failure.
    #[error(transparent)]
    Gpu(#[from] GpuError),

    /// Configuration rejected.
    #[error(transparent)]
    Config(#[from] vulkandemo_core::Error),

    /// Windowing or event loop failure.
    #[error("Platform error: {0}")]
    Platform(String),

    /// Failure from application-supplied callbacks.
    #[error(transparent)]
    App(#[from] anyhow::Error),
}
