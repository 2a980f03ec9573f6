//! Physical device capabilities and requirement checks.

use ash::vk;
use std::collections::HashSet;
use std::ffi::CStr;

/// Vendor, from the PCI id in the device properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
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

/// Short lowercase name for a device type.
pub fn device_type_name(device_type: vk::PhysicalDeviceType) -> &'static str {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
        vk::PhysicalDeviceType::CPU => "cpu",
        _ => "other",
    }
}

/// Whether a packed Vulkan version is at least `major.minor`.
pub fn api_at_least(version: u32, major: u32, minor: u32) -> bool {
    let (v_major, v_minor) = (vk::api_version_major(version), vk::api_version_minor(version));
    v_major > major || (v_major == major && v_minor >= minor)
}

/// What a physical device offers, as far as device selection cares.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    /// Packed `VK_MAKE_API_VERSION` value.
    pub api_version: u32,
    pub driver_version: u32,
    pub supports_dynamic_rendering: bool,
    pub supports_synchronization2: bool,
    /// Sum of all DEVICE_LOCAL heaps.
    pub device_local_memory_mb: u64,
    pub max_compute_workgroup_size: [u32; 3],
    pub max_compute_workgroup_count: [u32; 3],
    pub max_compute_workgroup_invocations: u32,
    pub available_extensions: HashSet<String>,
}

fn device_local_mb(memory: &vk::PhysicalDeviceMemoryProperties) -> u64 {
    let heaps = &memory.memory_heaps[..memory.memory_heap_count as usize];
    heaps
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size >> 20)
        .sum()
}

/// # Safety
/// The handles must be valid.
unsafe fn extension_names(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> HashSet<String> {
    let properties = unsafe { instance.enumerate_device_extension_properties(physical_device) }
        .unwrap_or_default();
    properties
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok())
        .filter_map(|name| name.to_str().ok().map(str::to_owned))
        .collect()
}

/// Dynamic rendering and synchronization2 support. The 1.3 feature struct
/// may only be chained on 1.3 devices.
///
/// # Safety
/// The handles must be valid.
unsafe fn vulkan13_features(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    api_version: u32,
) -> (bool, bool) {
    if !api_at_least(api_version, 1, 3) {
        return (false, false);
    }
    let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features = vk::PhysicalDeviceFeatures2::default().push_next(&mut features13);
    unsafe { instance.get_physical_device_features2(physical_device, &mut features) };
    (
        features13.dynamic_rendering == vk::TRUE,
        features13.synchronization2 == vk::TRUE,
    )
}

impl GpuCapabilities {
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory = unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let (supports_dynamic_rendering, supports_synchronization2) =
            unsafe { vulkan13_features(instance, physical_device, properties.api_version) };
        let limits = &properties.limits;

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            supports_dynamic_rendering,
            supports_synchronization2,
            device_local_memory_mb: device_local_mb(&memory),
            max_compute_workgroup_size: limits.max_compute_work_group_size,
            max_compute_workgroup_count: limits.max_compute_work_group_count,
            max_compute_workgroup_invocations: limits.max_compute_work_group_invocations,
            available_extensions: unsafe { extension_names(instance, physical_device) },
        }
    }

    /// Vulkan 1.3 with dynamic rendering and synchronization2.
    pub fn meets_requirements(&self) -> bool {
        api_at_least(self.api_version, 1, 3)
            && self.supports_dynamic_rendering
            && self.supports_synchronization2
    }

    /// Whether the device advertises an extension.
    pub fn supports_extension(&self, name: &CStr) -> bool {
        name.to_str()
            .is_ok_and(|name| self.available_extensions.contains(name))
    }

    /// `major.minor.patch` of the supported API.
    pub fn api_version_string(&self) -> String {
        format!(
            "{}.{}.{}",
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
        )
    }

    /// One line for logs: name, vendor, type, API version and VRAM.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {}) - Vulkan {} - {} MB VRAM",
            self.device_name,
            self.vendor,
            device_type_name(self.device_type),
            self.api_version_string(),
            self.device_local_memory_mb,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_capabilities() -> GpuCapabilities {
        GpuCapabilities {
            vendor: GpuVendor::Nvidia,
            device_name: "Test GPU".to_string(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            api_version: vk::make_api_version(0, 1, 3, 250),
            driver_version: 1,
            supports_dynamic_rendering: true,
            supports_synchronization2: true,
            device_local_memory_mb: 8192,
            max_compute_workgroup_size: [1024, 1024, 64],
            max_compute_workgroup_count: [65535, 65535, 65535],
            max_compute_workgroup_invocations: 1024,
            available_extensions: HashSet::from(["VK_KHR_swapchain".to_string()]),
        }
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn api_version_comparison() {
        assert!(api_at_least(vk::make_api_version(0, 1, 3, 0), 1, 3));
        assert!(api_at_least(vk::make_api_version(0, 2, 0, 0), 1, 3));
        assert!(!api_at_least(vk::make_api_version(0, 1, 2, 198), 1, 3));
    }

    #[test]
    fn requirements_need_vulkan_1_3_features() {
        let caps = sample_capabilities();
        assert!(caps.meets_requirements());

        let old = GpuCapabilities {
            api_version: vk::make_api_version(0, 1, 2, 0),
            ..caps.clone()
        };
        assert!(!old.meets_requirements());

        let no_sync2 = GpuCapabilities {
            supports_synchronization2: false,
            ..caps
        };
        assert!(!no_sync2.meets_requirements());
    }

    #[test]
    fn extension_lookup() {
        let caps = sample_capabilities();
        assert!(caps.supports_extension(ash::khr::swapchain::NAME));
        assert!(!caps.supports_extension(c"VK_KHR_ray_query"));
    }

    #[test]
    fn summary_format() {
        insta::assert_snapshot!(
            sample_capabilities().summary(),
            @"Test GPU (Nvidia, discrete) - Vulkan 1.3.250 - 8192 MB VRAM"
        );
    }
}
