//! Per-frame context for rendering.

use ash::vk;
use smv_gpu::rendering::{begin_rendering, end_rendering, set_full_viewport};
use smv_gpu::{transition_image_layout, ColorTarget, DepthBuffer, DepthTarget};

/// Context for the current frame being rendered.
///
/// Provides access to the command buffer and swapchain image for this frame.
pub struct FrameContext {
    /// Command buffer for recording rendering commands.
    pub command_buffer: vk::CommandBuffer,
    /// Frame slot in `0..frames_in_flight`.
    pub frame_index: usize,
    /// Index of the acquired swapchain image.
    pub image_index: u32,
    /// The swapchain image for this frame.
    pub swapchain_image: vk::Image,
    /// View of the swapchain image.
    pub swapchain_view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    /// Delta time since last frame in seconds.
    pub dt: f32,
    /// Current frame number.
    pub frame_number: u64,
}

impl FrameContext {
    /// Transition the swapchain image for drawing and begin dynamic rendering
    /// with a full-extent viewport and scissor.
    ///
    /// When `depth` is given it is cleared to 1.0 and bound as the depth
    /// attachment.
    ///
    /// # Safety
    /// `device` must own the command buffer, which must be recording.
    pub unsafe fn begin_color_pass(
        &self,
        device: &ash::Device,
        clear_color: [f32; 4],
        depth: Option<&DepthBuffer>,
    ) -> smv_gpu::Result<()> {
        let cmd = self.command_buffer;
        unsafe {
            transition_image_layout(
                device,
                cmd,
                self.swapchain_image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            )?;
            if let Some(depth) = depth {
                depth.cmd_prepare(device, cmd)?;
            }

            let color = ColorTarget::new(self.swapchain_view).with_clear_color(clear_color);
            let depth_target = depth.map(|d| DepthTarget::new(d.view));
            begin_rendering(device, cmd, self.extent, &color, depth_target.as_ref());
            set_full_viewport(device, cmd, self.extent);
        }
        Ok(())
    }

    /// End rendering and transition the swapchain image for presentation.
    ///
    /// # Safety
    /// Must pair with [`Self::begin_color_pass`] on the same frame.
    pub unsafe fn end_color_pass(&self, device: &ash::Device) -> smv_gpu::Result<()> {
        unsafe {
            end_rendering(device, self.command_buffer);
            transition_image_layout(
                device,
                self.command_buffer,
                self.swapchain_image,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::PRESENT_SRC_KHR,
            )
        }
    }
}
