//! Surface management for windowed rendering.
//!
//! The surface is created together with the GPU context so that device
//! selection can check presentation support.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::swapchain::{
    calculate_extent, select_image_count, select_present_mode, select_surface_format, Swapchain,
    SwapchainDesc,
};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

/// Anything that exposes raw display and window handles.
pub trait WindowHandles: HasDisplayHandle + HasWindowHandle {}

impl<T: HasDisplayHandle + HasWindowHandle + ?Sized> WindowHandles for T {}

/// Create a Vulkan surface for a window.
///
/// # Safety
/// The instance must have been created with the window system's surface
/// extensions, and the window must outlive the surface.
pub unsafe fn create_surface(
    entry: &ash::Entry,
    instance: &ash::Instance,
    window: &dyn WindowHandles,
) -> Result<vk::SurfaceKHR> {
    let display = window
        .display_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get display handle: {e}")))?;
    let window_handle = window
        .window_handle()
        .map_err(|e| GpuError::SurfaceCreation(format!("Failed to get window handle: {e}")))?;

    let surface = unsafe {
        ash_window::create_surface(
            entry,
            instance,
            display.as_raw(),
            window_handle.as_raw(),
            None,
        )
    }
    .map_err(|e| GpuError::SurfaceCreation(e.to_string()))?;

    tracing::debug!("Surface created");
    Ok(surface)
}

/// Surface context for windowed rendering.
///
/// Owns the surface together with the surface and swapchain loaders.
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
    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceCapabilities> {
        unsafe {
            let capabilities = self
                .surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?;

            let formats = self
                .surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)?;

            let present_modes = self
                .surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?;

            Ok(SurfaceCapabilities {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// Create a swapchain for this surface.
    ///
    /// `old_swapchain` is handed to the driver so it can recycle resources;
    /// the caller still destroys it afterwards.
    ///
    /// # Safety
    /// The GPU context must own this surface.
    pub unsafe fn create_swapchain(
        &self,
        gpu: &GpuContext,
        width: u32,
        height: u32,
        vsync: bool,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Swapchain> {
        let caps = self.capabilities(gpu.physical_device())?;

        let graphics = gpu.graphics_queue_family()?;
        let present = gpu
            .queue_families()
            .present
            .ok_or_else(|| GpuError::InvalidState("context has no present queue".into()))?;
        let queue_family_indices = if graphics == present {
            vec![graphics]
        } else {
            vec![graphics, present]
        };

        let desc = SwapchainDesc {
            surface_format: select_surface_format(&caps.formats)?,
            present_mode: select_present_mode(&caps.present_modes, vsync),
            extent: calculate_extent(&caps.capabilities, width, height),
            image_count: select_image_count(&caps.capabilities),
            queue_family_indices,
            old_swapchain,
        };

        unsafe {
            Swapchain::new(
                gpu.device(),
                &self.swapchain_loader,
                self.surface,
                &caps.capabilities,
                &desc,
            )
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// Every swapchain created from this surface must already be destroyed.
    pub unsafe fn destroy(&self) {
        unsafe {
            self.surface_loader.destroy_surface(self.surface, None);
        }
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
