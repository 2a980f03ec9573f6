//! Perspective projection demo
//!
//! Two coloured quads at different heights, viewed from below through an
//! off-centre frustum. The depth buffer decides which quad is in front.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p smv-perspective -- [OPTIONS]
//! ```
//!
//! Accepts the common window, validation and screenshot options; run with
//! `--help` for the full list.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use ash::vk;
use glam::{Mat4, Vec3};
use smv_app::{run_app, AppConfig, AppContext, FrameContext, SmvApp};
use smv_core::geometry::{PERSPECTIVE_QUADS, PERSPECTIVE_QUAD_INDICES};
use smv_core::math::{frustum_lh, vulkan_clip_correction};
use smv_core::{ColorVertex, TransformUniforms};
use smv_gpu::{
    create_device_local_buffer, update_device_local_buffer, write_uniform_buffer, DepthBuffer,
    DescriptorPool, DescriptorSetLayoutBuilder, GpuBuffer, GraphicsPipeline,
    GraphicsPipelineConfig, VertexLayout,
};
use tracing::{error, info};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const EYE: Vec3 = Vec3::new(0.0, -2.0, 0.0);
const UP: Vec3 = Vec3::new(0.0, 0.0, -1.0);
const NEAR: f32 = 1.0;
const FAR: f32 = 100.0;
/// Half height of the frustum on the near plane.
const HALF_HEIGHT: f32 = 2.0;

/// Camera matrices for a swapchain with the given aspect ratio.
fn transforms(aspect: f32) -> TransformUniforms {
    let view = Mat4::look_at_lh(EYE, Vec3::ZERO, UP);
    let half_width = HALF_HEIGHT * aspect;
    let projection = vulkan_clip_correction()
        * frustum_lh(-half_width, half_width, -HALF_HEIGHT, HALF_HEIGHT, NEAR, FAR);
    TransformUniforms::new(Mat4::IDENTITY, view, projection)
}

struct Perspective {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    uniform_buffer: GpuBuffer,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,
    pipeline: GraphicsPipeline,
    depth: DepthBuffer,
}

impl SmvApp for Perspective {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let gpu = &ctx.gpu;
        let device = gpu.device();
        let queue = gpu.graphics_queue()?;
        let pool = &ctx.command_pool;

        let vertex_buffer = create_device_local_buffer(
            gpu,
            pool,
            queue,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&PERSPECTIVE_QUADS),
            "quad vertices",
        )?;
        let index_buffer = create_device_local_buffer(
            gpu,
            pool,
            queue,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&PERSPECTIVE_QUAD_INDICES),
            "quad indices",
        )?;
        let uniform_buffer = create_device_local_buffer(
            gpu,
            pool,
            queue,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            bytemuck::bytes_of(&transforms(ctx.aspect_ratio())),
            "transforms",
        )?;

        let depth = DepthBuffer::new(gpu, ctx.extent())?;

        // SAFETY: device is valid; the set only ever holds `uniform_buffer`
        let (set_layout, descriptor_pool, descriptor_set) = unsafe {
            let bindings =
                DescriptorSetLayoutBuilder::new().uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
            let set_layout = bindings.build(device)?;
            let descriptor_pool = DescriptorPool::new(device, 1, &bindings.pool_sizes(1))?;
            let descriptor_set = descriptor_pool.allocate(device, &[set_layout])?[0];
            write_uniform_buffer(
                device,
                descriptor_set,
                0,
                uniform_buffer.buffer,
                0,
                TransformUniforms::SIZE,
            );
            (set_layout, descriptor_pool, descriptor_set)
        };

        let config = GraphicsPipelineConfig {
            vertex_shader: smv_shaders::colored_vert().to_vec(),
            fragment_shader: smv_shaders::colored_frag().to_vec(),
            vertex_bindings: vec![ColorVertex::binding_description()],
            vertex_attributes: ColorVertex::attribute_descriptions(),
            cull_mode: vk::CullModeFlags::NONE,
            color_formats: vec![ctx.color_format()],
            ..Default::default()
        }
        .with_depth(depth.format);

        // SAFETY: embedded shaders match the set layout
        let pipeline = unsafe { GraphicsPipeline::new(device, &config, &[set_layout], &[])? };

        info!("Perspective demo ready (depth format {:?})", depth.format);

        Ok(Self {
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            set_layout,
            descriptor_pool,
            descriptor_set,
            pipeline,
            depth,
        })
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let device = ctx.device();
        let cmd = frame.command_buffer;

        // SAFETY: the frame's command buffer is recording
        unsafe {
            frame.begin_color_pass(device, CLEAR_COLOR, Some(&self.depth))?;

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptor_set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(cmd, PERSPECTIVE_QUAD_INDICES.len() as u32, 1, 0, 0, 0);

            frame.end_color_pass(device)?;
        }

        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        let gpu = &ctx.gpu;
        let extent = vk::Extent2D { width, height };

        let depth = DepthBuffer::with_format(gpu, extent, self.depth.format)?;
        let mut old = std::mem::replace(&mut self.depth, depth);
        // SAFETY: the device is idle during swapchain recreation
        unsafe { old.destroy(gpu)? };

        update_device_local_buffer(
            gpu,
            &ctx.command_pool,
            gpu.graphics_queue()?,
            &self.uniform_buffer,
            bytemuck::bytes_of(&transforms(ctx.aspect_ratio())),
        )?;
        Ok(())
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        let gpu = &ctx.gpu;
        let device = gpu.device();

        // SAFETY: the device is idle
        unsafe {
            self.pipeline.destroy(device);
            self.descriptor_pool.destroy(device);
            device.destroy_descriptor_set_layout(self.set_layout, None);
            if let Err(e) = self.depth.destroy(gpu) {
                error!("Failed to free depth buffer: {e}");
            }
        }

        let mut allocator = gpu.allocator().lock();
        for buffer in [
            &mut self.vertex_buffer,
            &mut self.index_buffer,
            &mut self.uniform_buffer,
        ] {
            if let Err(e) = allocator.free_buffer(buffer) {
                error!("Failed to free buffer: {e}");
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    run_app::<Perspective>(AppConfig::new("Perspective").with_args(&args)?)
}

fn print_help() {
    eprintln!(
        "Perspective projection demo

USAGE:
    cargo run -p smv-perspective -- [OPTIONS]

OPTIONS:
    --width <N>               Window width (default: 800)
    --height <N>              Window height (default: 600)
    --vsync                   Present with FIFO
    --validation              Enable validation layers
    --no-validation           Disable validation layers
    --frames-in-flight <N>    Frames recorded ahead of the GPU (default: 2)
    --exit-after-frames <N>   Exit after N frames

SCREENSHOT OPTIONS:
    -S, --screenshot        Enable screenshot capture mode
    -o, --output <PATTERN>  Output path pattern (use {{}} for frame number)
    -f, --frames <FRAMES>   Frame indices to capture (e.g. \"0,10,20\" or \"0-5\")
    --exit-after            Exit after capturing all specified frames

OTHER:
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use smv_core::math::project_point;

    fn view_projection(aspect: f32) -> Mat4 {
        let t = transforms(aspect);
        Mat4::from_cols_array_2d(&t.projection) * Mat4::from_cols_array_2d(&t.view)
    }

    #[test]
    fn origin_is_centered() {
        let ndc = project_point(view_projection(4.0 / 3.0), Vec3::ZERO);
        assert_abs_diff_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(ndc.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn red_quad_is_in_front_of_blue() {
        let matrix = view_projection(1.0);
        let red = project_point(matrix, Vec3::new(0.0, 0.0, 0.0));
        let blue = project_point(matrix, Vec3::new(0.0, 1.0, 0.0));
        assert!((0.0..=1.0).contains(&red.z));
        assert!((0.0..=1.0).contains(&blue.z));
        assert!(red.z < blue.z);
    }

    #[test]
    fn wider_windows_see_more() {
        let point = Vec3::new(2.0, 0.0, 0.0);
        let narrow = project_point(view_projection(1.0), point);
        let wide = project_point(view_projection(2.0), point);
        assert_abs_diff_eq!(wide.x * 2.0, narrow.x, epsilon = 1e-5);
    }
}
