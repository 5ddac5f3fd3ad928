//! Adapter capability detection and selection.

use ash::vk;
use std::ffi::CStr;

use crate::error::{GpuError, Result};

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Capabilities of one physical device, as relevant to device selection.
#[derive(Debug, Clone)]
pub struct AdapterCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type (discrete, integrated, ...)
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,
    /// Device-local memory in MB
    pub device_local_memory_mb: u64,
    /// Index of the first graphics-capable queue family, if any
    pub graphics_queue_family: Option<u32>,
    /// Index of the first queue family able to present to the probe
    /// surface, if any
    pub present_queue_family: Option<u32>,
    /// Swapchain device extension present
    pub has_swapchain_extension: bool,
}

impl AdapterCapabilities {
    /// Query capabilities from a physical device against a probe surface.
    ///
    /// # Safety
    /// The instance, surface and physical device must be valid.
    pub unsafe fn query(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);
        let queue_families = instance.get_physical_device_queue_family_properties(physical_device);

        let vendor = GpuVendor::from_vendor_id(properties.vendor_id);
        let device_name = CStr::from_ptr(properties.device_name.as_ptr())
            .to_string_lossy()
            .into_owned();

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let graphics_queue_family = queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|i| i as u32);

        let present_queue_family = (0..queue_families.len() as u32).find(|&i| {
            surface_loader
                .get_physical_device_surface_support(physical_device, i, surface)
                .unwrap_or(false)
        });

        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();
        let has_swapchain_extension = extensions.iter().any(|ext| {
            CStr::from_ptr(ext.extension_name.as_ptr()) == ash::khr::swapchain::NAME
        });

        Self {
            vendor,
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            device_local_memory_mb,
            graphics_queue_family,
            present_queue_family,
            has_swapchain_extension,
        }
    }

    /// The first mandatory capability this adapter is missing, if any.
    pub fn missing_requirement(&self) -> Option<&'static str> {
        let api_major = vk::api_version_major(self.api_version);
        let api_minor = vk::api_version_minor(self.api_version);
        if api_major < 1 || (api_major == 1 && api_minor < 3) {
            return Some("Vulkan 1.3 support");
        }
        if self.graphics_queue_family.is_none() {
            return Some("a graphics-capable queue family");
        }
        if self.present_queue_family.is_none() {
            return Some("presentation support for the surface");
        }
        if !self.has_swapchain_extension {
            return Some("the VK_KHR_swapchain extension");
        }
        None
    }

    /// Preference score among adapters that meet all requirements.
    pub fn score(&self) -> i32 {
        let mut score = 0;

        match self.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => score += 1000,
            vk::PhysicalDeviceType::INTEGRATED_GPU => score += 100,
            vk::PhysicalDeviceType::VIRTUAL_GPU => score += 50,
            _ => {}
        }

        // +1 per GB of device-local memory
        score += (self.device_local_memory_mb / 1024) as i32;

        score
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Pick the highest-scoring adapter that satisfies every mandatory
/// capability.
///
/// Returns the index into `candidates`, or [`GpuError::NoSuitableDevice`]
/// naming the capability the closest candidate was missing.
pub fn pick_adapter(candidates: &[AdapterCapabilities]) -> Result<usize> {
    if candidates.is_empty() {
        return Err(GpuError::NoSuitableDevice(
            "no Vulkan-capable devices enumerated".to_string(),
        ));
    }

    let mut best: Option<(usize, i32)> = None;
    let mut first_missing = None;

    for (idx, caps) in candidates.iter().enumerate() {
        if let Some(missing) = caps.missing_requirement() {
            tracing::debug!("{} rejected: missing {}", caps.device_name, missing);
            first_missing.get_or_insert((caps.device_name.clone(), missing));
            continue;
        }
        let score = caps.score();
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }

    match best {
        Some((idx, _)) => Ok(idx),
        None => {
            let (name, missing) = first_missing
                .unwrap_or_else(|| ("<unknown>".to_string(), "required capabilities"));
            Err(GpuError::NoSuitableDevice(format!(
                "no device offers {missing} (e.g. {name})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter(name: &str, device_type: vk::PhysicalDeviceType, vram_mb: u64) -> AdapterCapabilities {
        AdapterCapabilities {
            vendor: GpuVendor::Other(0),
            device_name: name.to_string(),
            device_type,
            api_version: vk::API_VERSION_1_3,
            driver_version: 0,
            device_local_memory_mb: vram_mb,
            graphics_queue_family: Some(0),
            present_queue_family: Some(0),
            has_swapchain_extension: true,
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
    }

    #[test]
    fn discrete_gpu_preferred_over_integrated() {
        let candidates = vec![
            adapter("igpu", vk::PhysicalDeviceType::INTEGRATED_GPU, 4096),
            adapter("dgpu", vk::PhysicalDeviceType::DISCRETE_GPU, 8192),
        ];
        assert_eq!(pick_adapter(&candidates).unwrap(), 1);
    }

    #[test]
    fn more_vram_breaks_ties() {
        let candidates = vec![
            adapter("small", vk::PhysicalDeviceType::DISCRETE_GPU, 2048),
            adapter("large", vk::PhysicalDeviceType::DISCRETE_GPU, 16384),
        ];
        assert_eq!(pick_adapter(&candidates).unwrap(), 1);
    }

    #[test]
    fn missing_graphics_queue_is_no_suitable_device() {
        let mut no_graphics = adapter("compute-only", vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        no_graphics.graphics_queue_family = None;

        let err = pick_adapter(&[no_graphics]).unwrap_err();
        match err {
            GpuError::NoSuitableDevice(msg) => {
                assert!(msg.contains("graphics"), "unexpected message: {msg}");
            }
            other => panic!("expected NoSuitableDevice, got {other:?}"),
        }
    }

    #[test]
    fn missing_present_support_is_no_suitable_device() {
        let mut headless = adapter("headless", vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        headless.present_queue_family = None;

        assert!(matches!(
            pick_adapter(&[headless]),
            Err(GpuError::NoSuitableDevice(_))
        ));
    }

    #[test]
    fn empty_candidate_list_is_no_suitable_device() {
        assert!(matches!(
            pick_adapter(&[]),
            Err(GpuError::NoSuitableDevice(_))
        ));
    }
}
