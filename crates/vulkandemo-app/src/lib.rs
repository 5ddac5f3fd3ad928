//! Application framework for vulkandemo.
//!
//! This crate provides a trait-based application framework that handles
//! common boilerplate like:
//! - Window creation and management
//! - Device context initialization
//! - Swapchain creation, staleness recovery and resize handling
//! - Frame synchronization and backpressure
//! - Event loop handling
//!
//! # Example
//!
//! ```no_run
//! use vulkandemo_app::{EngineConfig, FrameCanvas, RenderContext, VulkanApp, run_app};
//!
//! struct MyApp;
//!
//! impl VulkanApp for MyApp {
//!     fn init(ctx: &mut RenderContext) -> anyhow::Result<Self> {
//!         Ok(MyApp)
//!     }
//!
//!     fn record(&mut self, ctx: &RenderContext, frame: &mut FrameCanvas) -> anyhow::Result<()> {
//!         // Record commands against frame.image
//!         Ok(())
//!     }
//! }
//!
//! fn main() -> anyhow::Result<()> {
//!     run_app::<MyApp>(EngineConfig::new("my-app"))?;
//!     Ok(())
//! }
//! ```

mod app;
mod context;
mod error;
mod frame;
mod runner;
pub mod scheduler;

pub use app::VulkanApp;
pub use context::RenderContext;
pub use error::RunError;
pub use frame::FrameCanvas;
pub use runner::run_app;
pub use scheduler::{
    FrameEngine, FrameExtent, FrameScheduler, FrameTicket, SchedulerTimeouts, TickOutcome,
};

// Re-export commonly used types for convenience
pub use vulkandemo_core::{EngineConfig, PresentModePreference};
pub use vulkandemo_gpu::{DeviceContext, DeviceContextBuilder, GpuError};
