//! Application context.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ash::vk;
use smv_gpu::command::CommandPool;
use smv_gpu::sync::{create_fence, create_semaphore};
use smv_gpu::{GpuContext, GpuContextBuilder, InFlightTracker, Swapchain};
use tracing::{debug, info};
use winit::window::Window;

use crate::runner::{is_minimized, AppConfig};

/// Application context shared across all app methods.
///
/// Provides access to the GPU context, window, swapchain, and other
/// resources needed for rendering.
pub struct AppContext {
    /// GPU context with device, queues and the window surface.
    pub gpu: GpuContext,
    /// Current swapchain.
    pub swapchain: Swapchain,
    /// Command pool for the graphics queue family.
    pub command_pool: CommandPool,
    /// Per-frame synchronization data.
    pub(crate) frames: Vec<FrameSyncData>,
    /// Per-swapchain-image render finished semaphores.
    pub(crate) render_finished_semaphores: Vec<vk::Semaphore>,
    pub(crate) tracker: InFlightTracker<vk::Fence>,
    /// Total frames rendered.
    pub frame_count: u64,
    /// Time of last frame (for delta time calculation).
    pub(crate) last_frame_time: Instant,
    start_time: Instant,
    /// Whether vsync is enabled.
    pub vsync: bool,
    pub(crate) needs_recreate: bool,
    /// The window. Declared last so the surface inside `gpu` goes first.
    pub window: Arc<Window>,
}

/// Per-frame synchronization primitives.
#[derive(Clone, Copy)]
pub(crate) struct FrameSyncData {
    /// Semaphore signaled when swapchain image is available.
    pub image_available: vk::Semaphore,
    /// Fence signaled when frame rendering is complete.
    pub in_flight_fence: vk::Fence,
    /// Command buffer for this frame.
    pub command_buffer: vk::CommandBuffer,
}

impl AppContext {
    /// Create the GPU context for `window` along with the swapchain,
    /// command pool and per-frame synchronization objects.
    pub(crate) fn new(window: Arc<Window>, config: &AppConfig) -> anyhow::Result<Self> {
        let gpu = GpuContextBuilder::new()
            .app_name(&config.title)
            .validation(config.validation)
            .surface(&*window)
            .build()?;

        info!("GPU: {}", gpu.capabilities().summary());

        let size = window.inner_size();
        // SAFETY: the surface belongs to `gpu`
        let swapchain = unsafe {
            gpu.surface()?.create_swapchain(
                &gpu,
                size.width.max(1),
                size.height.max(1),
                config.vsync,
                None,
            )?
        };

        info!(
            "Swapchain created: {}x{} ({} images, {:?})",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count(),
            swapchain.present_mode
        );

        let device = gpu.device();
        // SAFETY: device is valid and the family comes from it
        let command_pool = unsafe {
            CommandPool::new(
                device,
                gpu.graphics_queue_family()?,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?
        };

        let frames_in_flight = config.frames_in_flight.max(1);
        let mut frames = Vec::with_capacity(frames_in_flight);
        // SAFETY: device and command pool are valid
        let command_buffers = unsafe { command_pool.allocate(device, frames_in_flight as u32)? };
        for command_buffer in command_buffers {
            frames.push(FrameSyncData {
                // SAFETY: device is valid
                image_available: unsafe { create_semaphore(device)? },
                // Signaled so the first wait on each slot returns immediately.
                // SAFETY: device is valid
                in_flight_fence: unsafe { create_fence(device, true)? },
                command_buffer,
            });
        }

        // SAFETY: device is valid
        let render_finished_semaphores =
            unsafe { create_semaphores(device, swapchain.image_count())? };
        let tracker = InFlightTracker::new(frames_in_flight, swapchain.image_count())?;

        debug!("{frames_in_flight} frames in flight");

        let now = Instant::now();
        Ok(Self {
            gpu,
            swapchain,
            command_pool,
            frames,
            render_finished_semaphores,
            tracker,
            frame_count: 0,
            last_frame_time: now,
            start_time: now,
            vsync: config.vsync,
            needs_recreate: false,
            window,
        })
    }

    /// Get the device.
    pub fn device(&self) -> &ash::Device {
        self.gpu.device()
    }

    /// Get the current swapchain extent.
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    /// Get the swapchain width.
    pub fn width(&self) -> u32 {
        self.swapchain.extent.width
    }

    /// Get the swapchain height.
    pub fn height(&self) -> u32 {
        self.swapchain.extent.height
    }

    /// Get the aspect ratio (width / height).
    pub fn aspect_ratio(&self) -> f32 {
        smv_core::math::aspect_ratio(self.swapchain.extent.width, self.swapchain.extent.height)
    }

    /// Swapchain image format, for pipeline creation.
    pub fn color_format(&self) -> vk::Format {
        self.swapchain.format
    }

    /// Get the number of frames in flight.
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Frame slot that the next `render` call records into.
    pub fn current_frame(&self) -> usize {
        self.tracker.current_frame()
    }

    /// Time since the context was created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Ask for the swapchain to be recreated before the next frame.
    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    /// Recreate the swapchain at the window's current size.
    ///
    /// Returns `false` without touching anything while the window is
    /// minimized.
    pub(crate) fn recreate_swapchain(&mut self) -> anyhow::Result<bool> {
        let size = self.window.inner_size();
        if is_minimized(size.width, size.height) {
            return Ok(false);
        }

        self.gpu.wait_idle()?;

        let surface = self.gpu.surface()?;
        // SAFETY: the surface belongs to `gpu` and the device is idle
        let swapchain = unsafe {
            surface.create_swapchain(
                &self.gpu,
                size.width,
                size.height,
                self.vsync,
                Some(self.swapchain.swapchain),
            )?
        };
        let old = std::mem::replace(&mut self.swapchain, swapchain);

        let device = self.gpu.device();
        // SAFETY: the device is idle so nothing references the old objects
        unsafe {
            old.destroy(device, &surface.swapchain_loader);
            destroy_semaphores(device, &mut self.render_finished_semaphores);
            self.render_finished_semaphores =
                create_semaphores(device, self.swapchain.image_count())?;
        }
        self.tracker.reset_images(self.swapchain.image_count());
        self.needs_recreate = false;

        info!(
            "Swapchain recreated: {}x{} ({} images)",
            self.swapchain.extent.width,
            self.swapchain.extent.height,
            self.swapchain.image_count()
        );

        Ok(true)
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        let _ = self.gpu.wait_idle();
        let device = self.gpu.device();

        // SAFETY: the device is idle
        unsafe {
            for frame in self.frames.drain(..) {
                device.destroy_semaphore(frame.image_available, None);
                device.destroy_fence(frame.in_flight_fence, None);
            }
            destroy_semaphores(device, &mut self.render_finished_semaphores);
            self.command_pool.destroy(device);
            if let Ok(surface) = self.gpu.surface() {
                self.swapchain.destroy(device, &surface.swapchain_loader);
            }
        }
    }
}

unsafe fn create_semaphores(
    device: &ash::Device,
    count: usize,
) -> smv_gpu::Result<Vec<vk::Semaphore>> {
    (0..count)
        .map(|_| unsafe { create_semaphore(device) })
        .collect()
}

unsafe fn destroy_semaphores(device: &ash::Device, semaphores: &mut Vec<vk::Semaphore>) {
    for semaphore in semaphores.drain(..) {
        unsafe { device.destroy_semaphore(semaphore, None) };
    }
}
