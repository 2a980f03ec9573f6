//! Vulkan instance creation and adapter enumeration.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use ash::vk;
use smv_core::constants::ENGINE_NAME;
use std::ffi::{c_char, CStr, CString};

/// Validation layers requested when validation is enabled.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![c"VK_LAYER_KHRONOS_validation"]
}

/// Instance extensions needed on every platform regardless of windowing.
fn platform_instance_extensions() -> Vec<&'static CStr> {
    let extensions = vec![
        #[cfg(target_os = "macos")]
        ash::khr::portability_enumeration::NAME,
    ];

    extensions
}

/// Keep only the requested layers the loader actually provides.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn filter_available_layers(
    entry: &ash::Entry,
    requested: &[&'static CStr],
) -> Result<Vec<&'static CStr>> {
    let available = unsafe { entry.enumerate_instance_layer_properties()? };

    Ok(requested
        .iter()
        .copied()
        .filter(|layer| {
            let found = available.iter().any(|props| {
                // SAFETY: layer_name is a NUL-terminated fixed-size array
                (unsafe { CStr::from_ptr(props.layer_name.as_ptr()) }) == *layer
            });
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect())
}

/// Whether the loader exposes an instance extension.
///
/// # Safety
/// The entry must be a valid Vulkan entry point.
pub unsafe fn instance_extension_available(entry: &ash::Entry, name: &CStr) -> Result<bool> {
    let available = unsafe { entry.enumerate_instance_extension_properties(None)? };
    Ok(available.iter().any(|props| {
        // SAFETY: extension_name is a NUL-terminated fixed-size array
        (unsafe { CStr::from_ptr(props.extension_name.as_ptr()) }) == name
    }))
}

/// A freshly created instance.
pub struct CreatedInstance {
    pub instance: ash::Instance,
    /// Validation layer and debug utils are both active.
    pub validation_enabled: bool,
}

/// Create a Vulkan instance.
///
/// `window_extensions` are the surface extensions reported by the window
/// system (empty for headless use). When validation is requested but the
/// layer is missing, the instance is created without it.
///
/// # Safety
/// The entry must be a valid Vulkan entry point and the extension pointers
/// must reference NUL-terminated strings that outlive this call.
pub unsafe fn create_instance(
    entry: &ash::Entry,
    app_name: &str,
    window_extensions: &[*const c_char],
    enable_validation: bool,
) -> Result<CreatedInstance> {
    let app_name = CString::new(app_name)
        .map_err(|e| GpuError::Other(format!("Invalid application name: {e}")))?;
    let engine_name = CString::new(ENGINE_NAME)
        .map_err(|e| GpuError::Other(format!("Invalid engine name: {e}")))?;

    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(&engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_3);

    let layers = if enable_validation {
        unsafe { filter_available_layers(entry, &validation_layers())? }
    } else {
        Vec::new()
    };

    let debug_utils = !layers.is_empty()
        && unsafe { instance_extension_available(entry, ash::ext::debug_utils::NAME)? };
    if enable_validation && !debug_utils {
        tracing::warn!("Validation requested but unavailable, continuing without it");
    }

    let mut extension_names: Vec<*const c_char> = window_extensions.to_vec();
    extension_names.extend(platform_instance_extensions().iter().map(|ext| ext.as_ptr()));
    if debug_utils {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
    }

    let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

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

    let instance = unsafe { entry.create_instance(&create_info, None)? };
    tracing::debug!(
        "Instance created ({} extensions, {} layers)",
        extension_names.len(),
        layer_names.len()
    );

    Ok(CreatedInstance {
        instance,
        validation_enabled: debug_utils,
    })
}

/// A physical device together with everything selection looks at.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub physical_device: vk::PhysicalDevice,
    pub capabilities: GpuCapabilities,
    pub queue_families: Vec<vk::QueueFamilyProperties>,
}

/// List every physical device the instance can see.
///
/// # Safety
/// The instance must be valid.
pub unsafe fn enumerate_adapters(instance: &ash::Instance) -> Result<Vec<AdapterInfo>> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    Ok(devices
        .into_iter()
        .map(|physical_device| {
            // SAFETY: handles come straight from the instance
            unsafe {
                AdapterInfo {
                    physical_device,
                    capabilities: GpuCapabilities::query(instance, physical_device),
                    queue_families: instance
                        .get_physical_device_queue_family_properties(physical_device),
                }
            }
        })
        .collect())
}

/// Score a device for selection. Higher is better.
pub fn score_device(capabilities: &GpuCapabilities) -> u64 {
    let type_score = match capabilities.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
        _ => 0,
    };

    // +1 per GB of VRAM
    type_score + capabilities.device_local_memory_mb / 1024
}

/// Pick the best adapter accepted by `is_suitable`.
pub fn select_adapter<F>(adapters: Vec<AdapterInfo>, mut is_suitable: F) -> Result<AdapterInfo>
where
    F: FnMut(&AdapterInfo) -> bool,
{
    adapters
        .into_iter()
        .filter(|adapter| {
            let suitable = is_suitable(adapter);
            if !suitable {
                tracing::debug!("Skipping unsuitable device {}", adapter.capabilities.device_name);
            }
            suitable
        })
        .max_by_key(|adapter| score_device(&adapter.capabilities))
        .ok_or(GpuError::NoSuitableDevice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::tests::sample_capabilities;

    fn adapter(name: &str, device_type: vk::PhysicalDeviceType, vram_mb: u64) -> AdapterInfo {
        AdapterInfo {
            physical_device: vk::PhysicalDevice::null(),
            capabilities: GpuCapabilities {
                device_name: name.to_string(),
                device_type,
                device_local_memory_mb: vram_mb,
                ..sample_capabilities()
            },
            queue_families: Vec::new(),
        }
    }

    #[test]
    fn discrete_beats_integrated() {
        let discrete = adapter("d", vk::PhysicalDeviceType::DISCRETE_GPU, 2048);
        let integrated = adapter("i", vk::PhysicalDeviceType::INTEGRATED_GPU, 16384);
        assert!(score_device(&discrete.capabilities) > score_device(&integrated.capabilities));
    }

    #[test]
    fn vram_breaks_ties() {
        let small = adapter("small", vk::PhysicalDeviceType::DISCRETE_GPU, 4096);
        let big = adapter("big", vk::PhysicalDeviceType::DISCRETE_GPU, 16384);
        let picked = select_adapter(vec![small, big], |_| true).unwrap();
        assert_eq!(picked.capabilities.device_name, "big");
    }

    #[test]
    fn unsuitable_adapters_are_skipped() {
        let discrete = adapter("discrete", vk::PhysicalDeviceType::DISCRETE_GPU, 8192);
        let cpu = adapter("cpu", vk::PhysicalDeviceType::CPU, 0);
        let picked = select_adapter(vec![discrete, cpu], |a| {
            a.capabilities.device_type == vk::PhysicalDeviceType::CPU
        })
        .unwrap();
        assert_eq!(picked.capabilities.device_name, "cpu");
    }

    #[test]
    fn no_adapter_is_an_error() {
        let result = select_adapter(Vec::new(), |_| true);
        assert!(matches!(result, Err(GpuError::NoSuitableDevice)));
    }

    #[test]
    fn khronos_validation_is_requested() {
        assert_eq!(validation_layers(), vec![c"VK_LAYER_KHRONOS_validation"]);
    }
}
