//! Vulkan instance creation.

use crate::error::{GpuError, Result};
use ash::vk;
use std::ffi::{CStr, CString};

/// Required instance extensions for presenting to a window.
pub fn required_instance_extensions() -> Vec<&'static CStr> {
    let extensions = vec![
        ash::khr::surface::NAME,
        #[cfg(target_os = "windows")]
        ash::khr::win32_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::xlib_surface::NAME,
        #[cfg(target_os = "linux")]
        ash::khr::wayland_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::ext::metal_surface::NAME,
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ];

    extensions
}

/// Validation layers to enable when requested.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Filter desired layers to those the driver actually offers, logging the
/// availability of each requested layer.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn filter_available_layers(
    entry: &ash::Entry,
    desired: &[&'static CStr],
) -> Result<Vec<&'static CStr>> {
    let available = entry.enumerate_instance_layer_properties()?;

    let mut enabled = Vec::with_capacity(desired.len());
    for layer in desired {
        let found = available.iter().any(|props| {
            let name = CStr::from_ptr(props.layer_name.as_ptr());
            name == *layer
        });
        if found {
            tracing::debug!("Layer {} (available)", layer.to_string_lossy());
            enabled.push(*layer);
        } else {
            tracing::warn!("Layer {} (unavailable)", layer.to_string_lossy());
        }
    }

    Ok(enabled)
}

/// Create a Vulkan instance.
///
/// Requests the surface extensions for the current platform, plus the
/// debug-utils extension and validation layers when `enable_validation`
/// is set. Driver rejection surfaces as [`GpuError::BackendInit`].
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    enable_validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(app_name).unwrap_or_default();
    let engine_name = c"vulkandemo";

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extensions = required_instance_extensions();
    if enable_validation {
        extensions.push(ash::ext::debug_utils::NAME);
    }
    let extension_names: Vec<*const i8> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let layers = if enable_validation {
        filter_available_layers(entry, &validation_layers())?
    } else {
        vec![]
    };
    let layer_names: Vec<*const i8> = layers.iter().map(|l| l.as_ptr()).collect();

    if tracing::enabled!(tracing::Level::DEBUG) {
        tracing::debug!("Enabling instance extensions:");
        for ext in &extensions {
            tracing::debug!("\t{}", ext.to_string_lossy());
        }
    }

    // Required for MoltenVK on macOS
    #[cfg(target_os = "macos")]
    let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
    #[cfg(not(target_os = "macos"))]
    let create_flags = vk::InstanceCreateFlags::empty();

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_extension_names(&extension_names)
        .enabled_layer_names(&layer_names)
        .flags(create_flags);

    let instance = entry
        .create_instance(&create_info, None)
        .map_err(GpuError::BackendInit)?;

    Ok(instance)
}
