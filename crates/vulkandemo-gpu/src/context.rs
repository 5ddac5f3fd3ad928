//! Device context management.

use std::collections::HashSet;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::capabilities::{pick_adapter, AdapterCapabilities};
use crate::diagnostics::{DebugMessenger, DiagnosticsBridge, DiagnosticsSink};
use crate::error::{GpuError, Result};
use crate::instance::create_instance;
use crate::surface::SurfaceContext;

/// Root owner of the Vulkan instance, physical device selection and the
/// logical device with its queues.
///
/// Exactly one context exists per process. It must outlive every resource
/// created from it and be dropped after all of them; releasing out of
/// order is a programming error, not a recoverable condition.
pub struct DeviceContext {
    // Entry must be kept alive for the lifetime of the context
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: AdapterCapabilities,
    pub(crate) diagnostics: DiagnosticsBridge,
    pub(crate) messenger: Option<DebugMessenger>,

    pub(crate) graphics_queue_family: u32,
    pub(crate) present_queue_family: u32,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,
}

impl DeviceContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the selected adapter's capabilities.
    pub fn capabilities(&self) -> &AdapterCapabilities {
        &self.capabilities
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Graphics and present queue handles; non-null after construction.
    /// The two may be the same queue on devices whose graphics family can
    /// present.
    pub fn queues(&self) -> (vk::Queue, vk::Queue) {
        (self.graphics_queue, self.present_queue)
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the graphics queue family index.
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    /// Get the present queue family index.
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    /// The diagnostics bridge receiving backend messages.
    pub fn diagnostics(&self) -> &DiagnosticsBridge {
        &self.diagnostics
    }

    /// Error out with [`GpuError::DeviceLost`] if the diagnostics bridge
    /// has latched a fatal condition. Checked by every operation that
    /// touches a queue.
    pub fn ensure_healthy(&self) -> Result<()> {
        self.diagnostics.ensure_healthy()
    }

    /// Wait for the device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            self.device.destroy_device(None);
            if let Some(messenger) = &self.messenger {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Builder for creating a device context.
pub struct DeviceContextBuilder {
    app_name: String,
    enable_validation: bool,
    sink: Option<Box<dyn DiagnosticsSink>>,
}

impl Default for DeviceContextBuilder {
    fn default() -> Self {
        Self {
            app_name: "vulkandemo".to_string(),
            enable_validation: cfg!(debug_assertions),
            sink: None,
        }
    }
}

impl DeviceContextBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Inject the sink receiving backend diagnostics. Defaults to the
    /// tracing-backed sink.
    #[must_use]
    pub fn diagnostics_sink(mut self, sink: Box<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build the device context and the surface for the given window.
    ///
    /// The surface doubles as the presentation-support probe during
    /// device selection, so both are created together. Partially created
    /// handles are released on every failure path.
    pub fn build<W>(self, window: &W) -> Result<(DeviceContext, SurfaceContext)>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let diagnostics = match self.sink {
            Some(sink) => DiagnosticsBridge::new(sink),
            None => DiagnosticsBridge::default(),
        };

        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let instance = unsafe { create_instance(&entry, &self.app_name, self.enable_validation) }?;

        let mut guard = InitGuard {
            instance: Some(&instance),
            messenger: None,
            surface: None,
        };

        let messenger = if self.enable_validation {
            match unsafe { DebugMessenger::new(&entry, &instance, &diagnostics) } {
                Ok(messenger) => Some(messenger),
                Err(e) => return Err(guard.fail(e)),
            }
        } else {
            None
        };
        guard.messenger = messenger.as_ref();

        let display = match window.display_handle() {
            Ok(handle) => handle,
            Err(e) => return Err(guard.fail(GpuError::SurfaceCreation(e.to_string()))),
        };
        let window_handle = match window.window_handle() {
            Ok(handle) => handle,
            Err(e) => return Err(guard.fail(GpuError::SurfaceCreation(e.to_string()))),
        };

        let surface = match unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                display.as_raw(),
                window_handle.as_raw(),
                None,
            )
        } {
            Ok(surface) => surface,
            Err(e) => return Err(guard.fail(GpuError::SurfaceCreation(e.to_string()))),
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        guard.surface = Some((&surface_loader, surface));

        let selected = Self::select_adapter(&instance, &surface_loader, surface);
        let (physical_device, capabilities) = match selected {
            Ok(selected) => selected,
            Err(e) => return Err(guard.fail(e)),
        };

        tracing::info!("Selected GPU: {}", capabilities.summary());

        // Prefer a single family doing both graphics and present.
        let (Some(graphics_family), Some(first_present_family)) = (
            capabilities.graphics_queue_family,
            capabilities.present_queue_family,
        ) else {
            // Unreachable in practice; selection filters these out.
            return Err(guard.fail(GpuError::NoSuitableDevice(
                "selected adapter lost its queue families".to_string(),
            )));
        };
        let graphics_can_present = unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, graphics_family, surface)
                .unwrap_or(false)
        };
        let present_family = if graphics_can_present {
            graphics_family
        } else {
            first_present_family
        };

        let device = match unsafe {
            create_device(&instance, physical_device, graphics_family, present_family)
        } {
            Ok(device) => device,
            Err(e) => return Err(guard.fail(e)),
        };

        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(graphics_family, 0),
                device.get_device_queue(present_family, 0),
            )
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(&instance, &device);

        // All fallible steps are done; the context takes ownership.
        guard.disarm();

        let surface_ctx = SurfaceContext::new(surface, surface_loader, swapchain_loader);
        let context = DeviceContext {
            entry,
            instance,
            physical_device,
            device: Arc::new(device),
            capabilities,
            diagnostics,
            messenger,
            graphics_queue_family: graphics_family,
            present_queue_family: present_family,
            graphics_queue,
            present_queue,
        };

        Ok((context, surface_ctx))
    }

    fn select_adapter(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, AdapterCapabilities)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        let candidates: Vec<AdapterCapabilities> = devices
            .iter()
            .map(|&device| unsafe {
                AdapterCapabilities::query(instance, surface_loader, surface, device)
            })
            .collect();

        if tracing::enabled!(tracing::Level::DEBUG) {
            for caps in &candidates {
                tracing::debug!("Device: {}", caps.summary());
            }
        }

        let index = pick_adapter(&candidates)?;
        Ok((devices[index], candidates[index].clone()))
    }
}

/// Releases partially initialized handles when construction fails midway.
struct InitGuard<'a> {
    instance: Option<&'a ash::Instance>,
    messenger: Option<&'a DebugMessenger>,
    surface: Option<(&'a ash::khr::surface::Instance, vk::SurfaceKHR)>,
}

impl InitGuard<'_> {
    fn fail(&mut self, error: GpuError) -> GpuError {
        unsafe {
            if let Some((loader, surface)) = self.surface.take() {
                loader.destroy_surface(surface, None);
            }
            if let Some(messenger) = self.messenger.take() {
                messenger.destroy();
            }
            if let Some(instance) = self.instance.take() {
                instance.destroy_instance(None);
            }
        }
        error
    }

    fn disarm(&mut self) {
        self.instance = None;
        self.messenger = None;
        self.surface = None;
    }
}

/// Create the logical device with the swapchain extension and the
/// synchronization2 feature enabled.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    graphics_family: u32,
    present_family: u32,
) -> Result<ash::Device> {
    let mut unique_families = HashSet::new();
    unique_families.insert(graphics_family);
    unique_families.insert(present_family);

    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions = [ash::khr::swapchain::NAME];
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_1_3_features =
        vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default().push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = instance
        .create_device(physical_device, &device_create_info, None)
        .map_err(GpuError::BackendInit)?;

    Ok(device)
}
