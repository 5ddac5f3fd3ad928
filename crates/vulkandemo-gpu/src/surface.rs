//! Surface management for windowed rendering.
//!
//! Wraps the Vulkan surface and the extension loaders needed to query
//! capabilities and build swapchains against it.

use ash::vk;
use vulkandemo_core::PresentModePreference;

use crate::context::DeviceContext;
use crate::error::Result;
use crate::swapchain::{calculate_extent, select_present_mode, select_surface_format, Swapchain};

/// Surface context for windowed rendering.
pub struct SurfaceContext {
    /// The Vulkan surface handle.
    pub surface: vk::SurfaceKHR,
    /// Surface extension loader.
    pub surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    pub swapchain_loader: ash::khr::swapchain::Device,
}

impl SurfaceContext {
    pub(crate) fn new(
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        swapchain_loader: ash::khr::swapchain::Device,
    ) -> Self {
        Self {
            surface,
            surface_loader,
            swapchain_loader,
        }
    }

    /// Query surface capabilities.
    pub fn capabilities(&self, gpu: &DeviceContext) -> Result<SurfaceCapabilities> {
        unsafe {
            let caps = self
                .surface_loader
                .get_physical_device_surface_capabilities(gpu.physical_device(), self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(gpu.physical_device(), self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(gpu.physical_device(), self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities: caps,
                formats,
                present_modes,
            })
        }
    }

    /// Create a swapchain for this surface.
    ///
    /// # Safety
    /// The GPU context must be valid.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &DeviceContext,
        width: u32,
        height: u32,
        preference: PresentModePreference,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Swapchain> {
        let caps = self.capabilities(gpu)?;

        let surface_format = select_surface_format(&caps.formats);
        let present_mode = select_present_mode(&caps.present_modes, preference);
        let extent = calculate_extent(&caps.capabilities, width, height);

        Swapchain::new(
            gpu.device(),
            &self.swapchain_loader,
            self.surface,
            &caps.capabilities,
            surface_format,
            present_mode,
            extent,
            old_swapchain,
            gpu.graphics_queue_family(),
        )
    }

    /// Recreate the swapchain with new dimensions.
    ///
    /// The old swapchain handle is passed as `old_swapchain` so the driver
    /// can carry presentation state over, then destroyed. Any outstanding
    /// image index from the old swapchain is invalid afterwards.
    ///
    /// # Safety
    /// The old swapchain's images must no longer be referenced by
    /// in-flight work.
    pub unsafe fn recreate_swapchain(
        &self,
        gpu: &DeviceContext,
        old_swapchain: &Swapchain,
        width: u32,
        height: u32,
        preference: PresentModePreference,
    ) -> Result<Swapchain> {
        let swapchain =
            self.create_swapchain(gpu, width, height, preference, Some(old_swapchain.swapchain))?;

        old_swapchain.destroy(gpu.device(), &self.swapchain_loader);

        tracing::info!(
            "Swapchain recreated: {}x{} ({} images)",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count()
        );

        Ok(swapchain)
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// The surface must not be in use and must be destroyed before the
    /// owning instance.
    pub unsafe fn destroy(&self) {
        self.surface_loader.destroy_surface(self.surface, None);
    }
}

/// Surface capabilities query result.
pub struct SurfaceCapabilities {
    /// Raw surface capabilities.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}
