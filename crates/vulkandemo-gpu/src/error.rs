//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
///
/// Initialization failures (`Loading`, `BackendInit`, `NoSuitableDevice`,
/// `SurfaceCreation`, `SwapchainCreate`) are fatal at startup.
/// `SwapchainStale` and `AcquireTimeout` are recoverable per frame and are
/// absorbed by the frame scheduler. `FrameTimeout`, `Present` and
/// `DeviceLost` require full teardown.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan library could not be loaded.
    #[error("Failed to load Vulkan library: {0}")]
    Loading(String),

    /// Instance or logical device creation rejected by the driver.
    #[error("Backend initialization rejected by driver: {0}")]
    BackendInit(vk::Result),

    /// No physical device satisfies the mandatory capabilities.
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreate(String),

    /// The swapchain no longer matches the surface; rebuild before reuse.
    #[error("Swapchain is stale and must be rebuilt")]
    SwapchainStale,

    /// No swapchain image became available within the timeout.
    #[error("Timed out acquiring a swapchain image")]
    AcquireTimeout,

    /// A frame slot's fence did not signal within the timeout.
    #[error("Timed out waiting for frame slot {slot}; likely device loss or deadlock")]
    FrameTimeout { slot: usize },

    /// Presentation rejected by the backend.
    #[error("Failed to present image: {0}")]
    Present(vk::Result),

    /// The device was lost; full reinitialization is required.
    #[error("Device lost")]
    DeviceLost,

    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;
