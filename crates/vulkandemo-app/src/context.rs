//! Render context wiring the GPU layer into the frame scheduler.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use vulkandemo_core::{EngineConfig, PresentModePreference};
use vulkandemo_gpu::command::{end_command_buffer, submit_command_buffers};
use vulkandemo_gpu::{
    AcquiredImage, DeviceContext, FramePool, GpuError, SurfaceContext, Swapchain,
};
use winit::window::Window;

use crate::frame::FrameCanvas;
use crate::scheduler::{FrameEngine, FrameExtent, FrameTicket};

/// Owns the window, device context, surface, swapchain and frame pool,
/// and implements the scheduler's [`FrameEngine`] seam against them.
pub struct RenderContext {
    window: Arc<Window>,
    gpu: DeviceContext,
    surface: SurfaceContext,
    swapchain: Swapchain,
    pool: FramePool,
    present_mode: PresentModePreference,
}

impl RenderContext {
    /// Create the render context for a window.
    ///
    /// # Safety
    /// The window must have valid handles and the device context must
    /// have been built against this window's surface.
    pub unsafe fn new(
        window: Arc<Window>,
        gpu: DeviceContext,
        surface: SurfaceContext,
        config: &EngineConfig,
    ) -> Result<Self, GpuError> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        // SAFETY: Caller guarantees the device context and surface are valid
        let swapchain =
            match unsafe { surface.create_swapchain(&gpu, width, height, config.present_mode, None) }
            {
                Ok(swapchain) => swapchain,
                Err(e) => {
                    // SAFETY: The surface is not in use yet
                    unsafe { surface.destroy() };
                    return Err(e);
                }
            };

        tracing::info!(
            "Swapchain created: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count()
        );

        // SAFETY: Device is valid
        let pool =
            match unsafe { FramePool::new(&gpu, config.frames_in_flight, swapchain.image_count()) }
            {
                Ok(pool) => pool,
                Err(e) => {
                    // SAFETY: Nothing has been submitted against these yet
                    unsafe {
                        swapchain.destroy(gpu.device(), &surface.swapchain_loader);
                        surface.destroy();
                    }
                    return Err(e);
                }
            };

        Ok(Self {
            window,
            gpu,
            surface,
            swapchain,
            pool,
            present_mode: config.present_mode,
        })
    }

    /// The window being rendered to.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// The device context.
    pub fn gpu(&self) -> &DeviceContext {
        &self.gpu
    }

    /// The current swapchain.
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.pool.frame_count()
    }

    /// Build the recording surface for an acquired frame.
    pub fn frame_canvas(&self, ticket: &FrameTicket) -> FrameCanvas {
        let slot = self.pool.slot(ticket.slot);
        let image_index = ticket.image_index as usize;
        FrameCanvas {
            command_buffer: slot.command_buffer,
            image_index: ticket.image_index,
            image: self.swapchain.images[image_index],
            view: self.swapchain.image_views[image_index],
            extent: self.swapchain.extent,
            frame_number: ticket.frame_number,
        }
    }

    /// Destroy all owned GPU resources in reverse construction order.
    ///
    /// The device context is torn down when the `RenderContext` is
    /// dropped afterwards.
    ///
    /// # Safety
    /// All in-flight work must have completed (see the scheduler's
    /// shutdown barrier).
    pub unsafe fn destroy(&mut self) {
        // SAFETY: Caller guarantees in-flight work has completed
        unsafe {
            let device = self.gpu.device();
            self.pool.destroy(device);
            self.swapchain.destroy(device, &self.surface.swapchain_loader);
            self.surface.destroy();
        }
    }
}

impl FrameEngine for RenderContext {
    fn frame_count(&self) -> usize {
        self.pool.frame_count()
    }

    fn wait_slot(&mut self, slot: usize, timeout: Duration) -> Result<(), GpuError> {
        self.gpu.ensure_healthy()?;
        unsafe { self.pool.wait_slot(self.gpu.device(), slot, timeout) }
    }

    fn acquire_image(&mut self, slot: usize, timeout: Duration) -> Result<AcquiredImage, GpuError> {
        unsafe {
            self.swapchain.acquire_next_image(
                &self.surface.swapchain_loader,
                self.pool.slot(slot).image_available,
                timeout.as_nanos() as u64,
            )
        }
    }

    fn begin_recording(&mut self, ticket: &FrameTicket) -> Result<(), GpuError> {
        unsafe {
            self.pool.begin_slot(self.gpu.device(), ticket.slot)?;
        }
        Ok(())
    }

    fn submit(&mut self, ticket: &FrameTicket) -> Result<(), GpuError> {
        self.gpu.ensure_healthy()?;

        let device = self.gpu.device();
        let slot = self.pool.slot(ticket.slot);
        let command_buffers = [slot.command_buffer];
        let wait_semaphores = [slot.image_available];
        let wait_stages = [vk::PipelineStageFlags::TRANSFER];
        let signal_semaphores = [self.pool.render_finished(ticket.image_index)];

        let result = unsafe {
            end_command_buffer(device, slot.command_buffer).and_then(|()| {
                submit_command_buffers(
                    device,
                    self.gpu.graphics_queue(),
                    &command_buffers,
                    &wait_semaphores,
                    &wait_stages,
                    &signal_semaphores,
                    slot.in_flight,
                )
            })
        };

        match result {
            Err(GpuError::Vulkan(vk::Result::ERROR_DEVICE_LOST)) => {
                self.gpu
                    .diagnostics()
                    .report_fatal("device lost during queue submit");
                Err(GpuError::DeviceLost)
            }
            other => other,
        }
    }

    fn present(&mut self, ticket: &FrameTicket) -> Result<(), GpuError> {
        let result = unsafe {
            self.swapchain.present(
                &self.surface.swapchain_loader,
                self.gpu.present_queue(),
                ticket.image_index,
                self.pool.render_finished(ticket.image_index),
            )
        };

        if matches!(result, Err(GpuError::DeviceLost)) {
            self.gpu
                .diagnostics()
                .report_fatal("device lost during present");
        }
        result
    }

    fn rebuild(&mut self, extent: FrameExtent) -> Result<(), GpuError> {
        // The old swapchain's images may be referenced by in-flight work;
        // drain the device before replacing them.
        self.gpu.wait_idle()?;

        let swapchain = unsafe {
            self.surface.recreate_swapchain(
                &self.gpu,
                &self.swapchain,
                extent.width,
                extent.height,
                self.present_mode,
            )
        }?;
        self.swapchain = swapchain;

        unsafe {
            self.pool
                .resize_image_semaphores(self.gpu.device(), self.swapchain.image_count())
        }
    }

    fn wait_all(&mut self, timeout: Duration) -> Result<(), GpuError> {
        unsafe { self.pool.wait_all(self.gpu.device(), timeout) }
    }
}
