//! Vulkan abstraction layer for vulkandemo.
//!
//! This crate provides:
//! - Instance and device management with capability-scored selection
//! - Surface and swapchain handling, including staleness recovery
//! - Per-frame resource pooling with fence-gated reuse
//! - A diagnostics bridge forwarding validation messages to the logger

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod diagnostics;
pub mod error;
pub mod frame;
pub mod instance;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use capabilities::{pick_adapter, AdapterCapabilities, GpuVendor};
pub use context::{DeviceContext, DeviceContextBuilder};
pub use descriptors::DescriptorPool;
pub use diagnostics::{DiagnosticSeverity, DiagnosticsBridge, DiagnosticsSink, TracingSink};
pub use error::{GpuError, Result};
pub use frame::{FramePool, FrameSlot};
pub use surface::{SurfaceCapabilities, SurfaceContext};
pub use swapchain::{AcquiredImage, Swapchain};
