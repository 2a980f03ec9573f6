//! Dynamic rendering helpers (Vulkan 1.3).

use ash::vk;

/// Color attachment cleared at the start of rendering and stored at the end.
#[derive(Debug, Clone, Copy)]
pub struct ColorTarget {
    pub view: vk::ImageView,
    pub clear_color: [f32; 4],
}

impl ColorTarget {
    pub fn new(view: vk::ImageView) -> Self {
        Self {
            view,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    fn attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
    }
}

/// Depth attachment cleared every frame; contents are discarded afterwards.
#[derive(Debug, Clone, Copy)]
pub struct DepthTarget {
    pub view: vk::ImageView,
    pub clear_depth: f32,
}

impl DepthTarget {
    pub fn new(view: vk::ImageView) -> Self {
        Self {
            view,
            clear_depth: 1.0,
        }
    }

    fn attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.clear_depth,
                    stencil: 0,
                },
            })
    }
}

/// Full-extent render area.
pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Viewport covering `extent` with the standard 0..1 depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Begin dynamic rendering into `color` and optionally `depth`.
///
/// # Safety
/// `cmd` must be recording and the attachments must already be in their
/// attachment layouts.
pub unsafe fn begin_rendering(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    extent: vk::Extent2D,
    color: &ColorTarget,
    depth: Option<&DepthTarget>,
) {
    let color_attachments = [color.attachment_info()];
    let depth_attachment = depth.map(DepthTarget::attachment_info);

    let mut rendering_info = vk::RenderingInfo::default()
        .render_area(full_rect(extent))
        .layer_count(1)
        .color_attachments(&color_attachments);

    if let Some(depth_attachment) = depth_attachment.as_ref() {
        rendering_info = rendering_info.depth_attachment(depth_attachment);
    }

    unsafe { device.cmd_begin_rendering(cmd, &rendering_info) };
}

/// End dynamic rendering.
///
/// # Safety
/// `cmd` must be inside a `begin_rendering` scope.
pub unsafe fn end_rendering(device: &ash::Device, cmd: vk::CommandBuffer) {
    unsafe { device.cmd_end_rendering(cmd) };
}

/// Set the dynamic viewport and scissor to cover `extent`.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn set_full_viewport(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    extent: vk::Extent2D,
) {
    unsafe {
        device.cmd_set_viewport(cmd, 0, &[full_viewport(extent)]);
        device.cmd_set_scissor(cmd, 0, &[full_rect(extent)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_covers_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
        assert_eq!(full_rect(extent).extent, extent);
    }

    #[test]
    fn targets_clear_to_defaults() {
        let color = ColorTarget::new(vk::ImageView::null());
        assert_eq!(color.clear_color, [0.0, 0.0, 0.0, 1.0]);
        let info = color.attachment_info();
        assert_eq!(info.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(info.store_op, vk::AttachmentStoreOp::STORE);

        let depth = DepthTarget::new(vk::ImageView::null());
        assert_eq!(depth.clear_depth, 1.0);
        let info = depth.attachment_info();
        assert_eq!(info.image_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
    }
}
