//! Instance, device, queues and allocator in one owner.

use crate::capabilities::GpuCapabilities;
use crate::debug::DebugMessenger;
use crate::error::{GpuError, Result};
use crate::instance::{create_instance, enumerate_adapters, select_adapter, AdapterInfo};
use crate::memory::GpuAllocator;
use crate::queue::{find_queue_families, QueueFamilyIndices, QueueRequirements};
use crate::surface::{create_surface, SurfaceContext, WindowHandles};
use ash::vk;
use parking_lot::Mutex;
use raw_window_handle::HasDisplayHandle;
use std::ffi::{c_char, CStr};
use std::sync::Arc;

/// Owns the Vulkan objects every program needs, torn down in reverse
/// creation order on drop.
pub struct GpuContext {
    #[allow(dead_code)]
    pub(crate) entry: ash::Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) debug_messenger: Option<DebugMessenger>,
    pub(crate) surface: Option<SurfaceContext>,
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,

    pub(crate) queue_families: QueueFamilyIndices,
    pub(crate) graphics_queue: Option<vk::Queue>,
    pub(crate) present_queue: Option<vk::Queue>,
    pub(crate) compute_queue: vk::Queue,
    pub(crate) compute_queue_family: u32,
}

impl GpuContext {
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Whether validation messages are being forwarded to the log.
    pub fn validation_enabled(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// All queue family indices chosen for this device.
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    pub fn graphics_queue_family(&self) -> Result<u32> {
        self.queue_families
            .graphics
            .ok_or_else(|| GpuError::InvalidState("context has no graphics queue".into()))
    }

    pub fn graphics_queue(&self) -> Result<vk::Queue> {
        self.graphics_queue
            .ok_or_else(|| GpuError::InvalidState("context has no graphics queue".into()))
    }

    pub fn present_queue(&self) -> Result<vk::Queue> {
        self.present_queue
            .ok_or_else(|| GpuError::InvalidState("context has no present queue".into()))
    }

    pub fn compute_queue_family(&self) -> u32 {
        self.compute_queue_family
    }

    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    pub fn surface(&self) -> Result<&SurfaceContext> {
        self.surface
            .as_ref()
            .ok_or_else(|| GpuError::InvalidState("context was created without a surface".into()))
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Allocations must be returned before the device goes away.
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);

            if let Some(surface) = self.surface.take() {
                surface.destroy();
            }
            if let Some(messenger) = self.debug_messenger.take() {
                messenger.destroy();
            }

            self.instance.destroy_instance(None);
        }
        tracing::debug!("GPU context destroyed");
    }
}

/// Options for [`GpuContext`] creation.
pub struct GpuContextBuilder<'w> {
    app_name: String,
    enable_validation: bool,
    require_graphics: bool,
    window: Option<&'w dyn WindowHandles>,
}

impl Default for GpuContextBuilder<'_> {
    fn default() -> Self {
        Self {
            app_name: "App".to_string(),
            enable_validation: cfg!(debug_assertions),
            require_graphics: true,
            window: None,
        }
    }
}

impl<'w> GpuContextBuilder<'w> {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Request `VK_LAYER_KHRONOS_validation`. Missing layers only warn.
    pub fn validation(mut self, enable: bool) -> Self {
        self.enable_validation = enable;
        self
    }

    /// Require a graphics queue. Headless compute programs turn this off.
    pub fn require_graphics(mut self, require: bool) -> Self {
        self.require_graphics = require;
        self
    }

    /// Create a surface for `window` and pick a device that can present to it.
    pub fn surface(mut self, window: &'w dyn WindowHandles) -> Self {
        self.window = Some(window);
        self
    }

    /// Run the whole bootstrap: instance, messenger, surface, device
    /// selection, logical device, queues and allocator.
    pub fn build(self) -> Result<GpuContext> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| GpuError::Other(format!("Failed to load Vulkan: {e}")))?;

        let window_extensions: &[*const c_char] = match self.window {
            Some(window) => {
                let display = window.display_handle().map_err(|e| {
                    GpuError::SurfaceCreation(format!("Failed to get display handle: {e}"))
                })?;
                ash_window::enumerate_required_extensions(display.as_raw())?
            }
            None => &[],
        };

        let created = unsafe {
            create_instance(
                &entry,
                &self.app_name,
                window_extensions,
                self.enable_validation,
            )?
        };
        let instance = created.instance;

        let debug_messenger = if created.validation_enabled {
            Some(unsafe { DebugMessenger::new(&entry, &instance)? })
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
        let surface = match self.window {
            Some(window) => Some(unsafe { create_surface(&entry, &instance, window)? }),
            None => None,
        };

        let requirements = QueueRequirements {
            graphics: self.require_graphics || surface.is_some(),
            present: surface.is_some(),
        };

        let adapters = unsafe { enumerate_adapters(&instance)? };
        let adapter = select_adapter(adapters, |adapter| unsafe {
            is_device_suitable(adapter, requirements, &surface_loader, surface)
        })?;

        tracing::info!("Selected GPU: {}", adapter.capabilities.summary());

        let queue_families = unsafe { queue_families_for(&adapter, &surface_loader, surface) };
        let compute_queue_family = queue_families.compute.ok_or(GpuError::NoSuitableDevice)?;

        let device = unsafe {
            create_device(
                &instance,
                &adapter,
                &queue_families,
                surface.is_some(),
            )?
        };

        let (graphics_queue, present_queue, compute_queue) = unsafe {
            (
                queue_families.graphics.map(|f| device.get_device_queue(f, 0)),
                queue_families.present.map(|f| device.get_device_queue(f, 0)),
                device.get_device_queue(compute_queue_family, 0),
            )
        };

        tracing::debug!(
            "Queue families: graphics={:?} present={:?} compute={}",
            queue_families.graphics,
            queue_families.present,
            compute_queue_family
        );

        let device = Arc::new(device);

        let allocator =
            unsafe { GpuAllocator::new(&instance, device.clone(), adapter.physical_device) }?;

        let surface = surface.map(|surface| {
            SurfaceContext::new(
                surface,
                surface_loader,
                ash::khr::swapchain::Device::new(&instance, &device),
            )
        });

        Ok(GpuContext {
            entry,
            instance,
            debug_messenger,
            surface,
            physical_device: adapter.physical_device,
            device,
            capabilities: adapter.capabilities,
            allocator: Mutex::new(allocator),
            queue_families,
            graphics_queue,
            present_queue,
            compute_queue,
            compute_queue_family,
        })
    }
}

/// Queue families of an adapter, taking presentation support into account.
///
/// # Safety
/// The surface (if any) must belong to the same instance as the adapter.
unsafe fn queue_families_for(
    adapter: &AdapterInfo,
    surface_loader: &ash::khr::surface::Instance,
    surface: Option<vk::SurfaceKHR>,
) -> QueueFamilyIndices {
    find_queue_families(&adapter.queue_families, |index| {
        surface.is_some_and(|surface| unsafe {
            surface_loader
                .get_physical_device_surface_support(adapter.physical_device, index, surface)
                .unwrap_or(false)
        })
    })
}

/// Whether an adapter can run the programs with the given requirements.
///
/// # Safety
/// The surface (if any) must belong to the same instance as the adapter.
unsafe fn is_device_suitable(
    adapter: &AdapterInfo,
    requirements: QueueRequirements,
    surface_loader: &ash::khr::surface::Instance,
    surface: Option<vk::SurfaceKHR>,
) -> bool {
    if !adapter.capabilities.meets_requirements() {
        return false;
    }

    let families = unsafe { queue_families_for(adapter, surface_loader, surface) };
    if !families.is_complete(requirements) {
        return false;
    }

    let Some(surface) = surface else {
        return true;
    };

    if !adapter
        .capabilities
        .supports_extension(ash::khr::swapchain::NAME)
    {
        return false;
    }

    // A device that cannot present in any format or mode is useless for a window.
    let pd = adapter.physical_device;
    let formats = unsafe {
        surface_loader
            .get_physical_device_surface_formats(pd, surface)
            .unwrap_or_default()
    };
    let present_modes = unsafe {
        surface_loader
            .get_physical_device_surface_present_modes(pd, surface)
            .unwrap_or_default()
    };

    !formats.is_empty() && !present_modes.is_empty()
}

/// Device extensions to enable.
fn device_extensions(adapter: &AdapterInfo, presenting: bool) -> Vec<&'static CStr> {
    let mut extensions = Vec::new();
    if presenting {
        extensions.push(ash::khr::swapchain::NAME);
    }
    // Must be enabled whenever a portability driver advertises it.
    if adapter
        .capabilities
        .supports_extension(ash::khr::portability_subset::NAME)
    {
        extensions.push(ash::khr::portability_subset::NAME);
    }
    extensions
}

/// Create the logical device.
///
/// # Safety
/// The instance and adapter must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    adapter: &AdapterInfo,
    queue_families: &QueueFamilyIndices,
    presenting: bool,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extensions = device_extensions(adapter, presenting);
    let extension_names: Vec<*const c_char> = extensions.iter().map(|ext| ext.as_ptr()).collect();

    let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
        .dynamic_rendering(true)
        .synchronization2(true);

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .features(vk::PhysicalDeviceFeatures::default())
        .push_next(&mut vulkan_1_3_features);

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .push_next(&mut features2);

    let device = unsafe {
        instance
            .create_device(adapter.physical_device, &device_create_info, None)
            .map_err(GpuError::from)?
    };

    Ok(device)
}
