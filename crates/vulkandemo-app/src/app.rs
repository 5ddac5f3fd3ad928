//! `VulkanApp` trait definition.

use winit::event::WindowEvent;

use crate::context::RenderContext;
use crate::frame::FrameCanvas;

/// Trait for vulkandemo applications.
///
/// The framework owns the window, device, swapchain and frame pacing;
/// implementers only record commands against the acquired image.
pub trait VulkanApp: Sized {
    /// Initialize the application, after the device and swapchain exist.
    fn init(ctx: &mut RenderContext) -> anyhow::Result<Self>;

    /// Record this frame's commands.
    ///
    /// Called between image acquisition and submission. The command
    /// buffer is already in the recording state; the framework ends and
    /// submits it. The recorded commands must leave the image in
    /// `PRESENT_SRC_KHR` layout.
    fn record(&mut self, ctx: &RenderContext, frame: &mut FrameCanvas) -> anyhow::Result<()>;

    /// Handle window events. Return `true` to consume the event.
    #[allow(unused_variables)]
    fn on_event(&mut self, event: &WindowEvent) -> bool {
        false
    }

    /// Handle window resize. The swapchain itself is rebuilt by the
    /// framework on the next frame; override to recreate size-dependent
    /// resources.
    #[allow(unused_variables)]
    fn on_resize(&mut self, ctx: &mut RenderContext, width: u32, height: u32) -> anyhow::Result<()> {
        Ok(())
    }

    /// Cleanup resources before shutdown. All GPU work has completed when
    /// this is called.
    #[allow(unused_variables)]
    fn cleanup(&mut self, ctx: &mut RenderContext) {}
}
