//! vulkandemo
//!
//! Minimal Vulkan application exercising the device and frame-lifecycle
//! engine: opens a window and clears it with a cycling colour every
//! frame.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p vulkandemo
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)
//!
//! ## Exit status
//!
//! Initialization failures map to distinct exit codes (see
//! [`exit_code`]) so operators can tell "no compatible GPU" from "driver
//! rejected request".

mod app;

use std::process::ExitCode;

use vulkandemo_app::{run_app, RunError};
use vulkandemo_core::EngineConfig;
use vulkandemo_gpu::GpuError;

use crate::app::ClearDemo;

const WIDTH: u32 = 800;
const HEIGHT: u32 = 600;

fn main() -> ExitCode {
    let config = EngineConfig::new("vulkandemo").with_size(WIDTH, HEIGHT);

    match run_app::<ClearDemo>(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vulkandemo: {err}");
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Exit code for a failed run:
///
/// - `2`: no GPU satisfies the mandatory capabilities
/// - `3`: the driver rejected instance or device creation (or the
///   Vulkan library could not be loaded)
/// - `4`: surface or swapchain creation failed
/// - `5`: the device was lost (or an in-flight frame never retired)
/// - `1`: anything else
fn exit_code(err: &RunError) -> u8 {
    match err {
        RunError::Gpu(gpu) => match gpu {
            GpuError::NoSuitableDevice(_) => 2,
            GpuError::BackendInit(_) | GpuError::Loading(_) => 3,
            GpuError::SurfaceCreation(_) | GpuError::SwapchainCreate(_) => 4,
            GpuError::DeviceLost | GpuError::FrameTimeout { .. } => 5,
            _ => 1,
        },
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn init_errors_map_to_distinct_codes() {
        let no_device = RunError::Gpu(GpuError::NoSuitableDevice("none".into()));
        let rejected = RunError::Gpu(GpuError::BackendInit(vk::Result::ERROR_INITIALIZATION_FAILED));
        let no_swapchain = RunError::Gpu(GpuError::SwapchainCreate("rejected".into()));
        let lost = RunError::Gpu(GpuError::DeviceLost);

        let codes = [
            exit_code(&no_device),
            exit_code(&rejected),
            exit_code(&no_swapchain),
            exit_code(&lost),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }

    #[test]
    fn other_errors_are_generic_failures() {
        let platform = RunError::Platform("event loop".into());
        assert_eq!(exit_code(&platform), 1);
    }
}
