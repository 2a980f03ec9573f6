//! Textured quad demo
//!
//! A quad lying in the XZ plane spins about +Y while the camera looks down
//! on it. The texture comes from a file or is generated as a checkerboard.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p smv-texture -- [--texture PATH] [OPTIONS]
//! ```
//!
//! Also accepts the common window, validation and screenshot options; run
//! with `--help` for the full list.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

use std::path::PathBuf;

use anyhow::Context as _;
use ash::vk;
use glam::{Mat4, Vec3};
use smv_app::{run_app, AppConfig, AppContext, FrameContext, SmvApp};
use smv_core::geometry::{TEXTURED_QUAD, TEXTURED_QUAD_INDICES};
use smv_core::math::perspective_vk;
use smv_core::{ImageData, TexturedVertex, TransformUniforms};
use smv_gpu::{
    create_device_local_buffer, write_combined_image_sampler, write_uniform_buffer, DepthBuffer,
    DescriptorPool, DescriptorSetLayoutBuilder, GpuBuffer, GraphicsPipeline,
    GraphicsPipelineConfig, MemoryLocation, Texture, VertexLayout,
};
use tracing::{error, info};

const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
const EYE: Vec3 = Vec3::new(0.0, 4.0, 0.0);
const UP: Vec3 = Vec3::new(0.0, 0.0, 1.0);
const DEGREES_PER_SECOND: f32 = 90.0;
const CHECKERBOARD_SIZE: u32 = 256;

/// `--texture PATH`, if given.
fn texture_path(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|arg| arg == "--texture")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn load_texture_data(path: Option<PathBuf>) -> anyhow::Result<ImageData> {
    match path {
        Some(path) => {
            info!("Loading texture {}", path.display());
            ImageData::load(&path).with_context(|| format!("failed to load {}", path.display()))
        }
        None => Ok(ImageData::checkerboard(
            CHECKERBOARD_SIZE,
            CHECKERBOARD_SIZE,
            CHECKERBOARD_SIZE / 8,
            [240, 240, 240, 255],
            [200, 60, 60, 255],
        )),
    }
}

/// Camera matrices after `seconds` of rotation.
fn transforms(seconds: f32, aspect: f32) -> TransformUniforms {
    let model = Mat4::from_rotation_y((seconds * DEGREES_PER_SECOND).to_radians());
    let view = Mat4::look_at_lh(EYE, Vec3::ZERO, UP);
    let projection = perspective_vk(90f32.to_radians(), aspect, 0.1, 100.0);
    TransformUniforms::new(model, view, projection)
}

struct TexturedQuad {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    /// One host-visible buffer per frame in flight.
    uniform_buffers: Vec<GpuBuffer>,
    texture: Texture,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    pipeline: GraphicsPipeline,
    depth: DepthBuffer,
}

impl SmvApp for TexturedQuad {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let gpu = &ctx.gpu;
        let device = gpu.device();
        let queue = gpu.graphics_queue()?;
        let pool = &ctx.command_pool;
        let frames = ctx.frames_in_flight();

        let args: Vec<String> = std::env::args().collect();
        let data = load_texture_data(texture_path(&args))?;
        let texture = Texture::from_image_data(gpu, pool, queue, &data, "quad texture")?;

        let vertex_buffer = create_device_local_buffer(
            gpu,
            pool,
            queue,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(&TEXTURED_QUAD),
            "quad vertices",
        )?;
        let index_buffer = create_device_local_buffer(
            gpu,
            pool,
            queue,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(&TEXTURED_QUAD_INDICES),
            "quad indices",
        )?;

        let uniform_buffers = {
            let mut allocator = gpu.allocator().lock();
            (0..frames)
                .map(|i| {
                    allocator.create_buffer(
                        TransformUniforms::SIZE,
                        vk::BufferUsageFlags::UNIFORM_BUFFER,
                        MemoryLocation::CpuToGpu,
                        &format!("transforms {i}"),
                    )
                })
                .collect::<smv_gpu::Result<Vec<_>>>()?
        };

        let depth = DepthBuffer::new(gpu, ctx.extent())?;

        // SAFETY: device is valid; every set gets its own uniform buffer
        let (set_layout, descriptor_pool, descriptor_sets) = unsafe {
            let bindings = DescriptorSetLayoutBuilder::new()
                .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
                .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT);
            let set_layout = bindings.build(device)?;
            let descriptor_pool =
                DescriptorPool::new(device, frames as u32, &bindings.pool_sizes(frames as u32))?;
            let layouts = vec![set_layout; frames];
            let descriptor_sets = descriptor_pool.allocate(device, &layouts)?;

            for (&set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
                write_uniform_buffer(device, set, 0, buffer.buffer, 0, TransformUniforms::SIZE);
                write_combined_image_sampler(device, set, 1, texture.view, texture.sampler);
            }
            (set_layout, descriptor_pool, descriptor_sets)
        };

        let config = GraphicsPipelineConfig {
            vertex_shader: smv_shaders::textured_vert().to_vec(),
            fragment_shader: smv_shaders::textured_frag().to_vec(),
            vertex_bindings: vec![TexturedVertex::binding_description()],
            vertex_attributes: TexturedVertex::attribute_descriptions(),
            cull_mode: vk::CullModeFlags::NONE,
            color_formats: vec![ctx.color_format()],
            ..Default::default()
        }
        .with_depth(depth.format);

        // SAFETY: embedded shaders match the set layout
        let pipeline = unsafe { GraphicsPipeline::new(device, &config, &[set_layout], &[])? };

        info!(
            "Textured quad ready ({}x{} texture, {frames} uniform buffers)",
            texture.extent.width, texture.extent.height
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            uniform_buffers,
            texture,
            set_layout,
            descriptor_pool,
            descriptor_sets,
            pipeline,
            depth,
        })
    }

    fn render(&mut self, ctx: &AppContext, frame: &mut FrameContext) -> anyhow::Result<()> {
        let device = ctx.device();
        let cmd = frame.command_buffer;
        let slot = frame.frame_index;

        // The frame fence has been waited on, so this slot's buffer is free.
        let uniforms = transforms(ctx.elapsed().as_secs_f32(), ctx.aspect_ratio());
        self.uniform_buffers[slot].write(std::slice::from_ref(&uniforms))?;

        // SAFETY: the frame's command buffer is recording
        unsafe {
            frame.begin_color_pass(device, CLEAR_COLOR, Some(&self.depth))?;

            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.layout,
                0,
                &[self.descriptor_sets[slot]],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_bind_index_buffer(cmd, self.index_buffer.buffer, 0, vk::IndexType::UINT16);
            device.cmd_draw_indexed(cmd, TEXTURED_QUAD_INDICES.len() as u32, 1, 0, 0, 0);

            frame.end_color_pass(device)?;
        }

        Ok(())
    }

    fn on_resize(&mut self, ctx: &mut AppContext, width: u32, height: u32) -> anyhow::Result<()> {
        let gpu = &ctx.gpu;
        let depth =
            DepthBuffer::with_format(gpu, vk::Extent2D { width, height }, self.depth.format)?;
        let mut old = std::mem::replace(&mut self.depth, depth);
        // SAFETY: the device is idle during swapchain recreation
        unsafe { old.destroy(gpu)? };
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
            if let Err(e) = self.texture.destroy(gpu) {
                error!("Failed to free texture: {e}");
            }
        }

        let mut allocator = gpu.allocator().lock();
        let buffers = self
            .uniform_buffers
            .iter_mut()
            .chain([&mut self.vertex_buffer, &mut self.index_buffer]);
        for buffer in buffers {
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

    run_app::<TexturedQuad>(AppConfig::new("Textured Quad").with_args(&args)?)
}

fn print_help() {
    eprintln!(
        "Textured quad demo

USAGE:
    cargo run -p smv-texture -- [OPTIONS]

OPTIONS:
    --texture <PATH>          Image to map onto the quad (default: checkerboard)
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

    #[test]
    fn texture_flag() {
        let args: Vec<String> = ["smv-texture", "--vsync", "--texture", "wood.png"]
            .map(String::from)
            .to_vec();
        assert_eq!(texture_path(&args), Some(PathBuf::from("wood.png")));
        assert_eq!(texture_path(&args[..2]), None);
        assert_eq!(texture_path(&args[..3]), None);
    }

    #[test]
    fn checkerboard_without_path() {
        let data = load_texture_data(None).unwrap();
        assert_eq!((data.width, data.height), (CHECKERBOARD_SIZE, CHECKERBOARD_SIZE));
    }

    #[test]
    fn quarter_turn_per_second() {
        let start = transforms(0.0, 1.0);
        let later = transforms(1.0, 1.0);
        assert_eq!(start.model, Mat4::IDENTITY.to_cols_array_2d());

        let rotated = Mat4::from_cols_array_2d(&later.model).transform_point3(Vec3::X);
        assert_abs_diff_eq!(rotated.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(rotated.z.abs(), 1.0, epsilon = 1e-5);
        assert_eq!(start.view, later.view);
    }

    #[test]
    fn quad_faces_the_camera() {
        let t = transforms(0.0, 4.0 / 3.0);
        let matrix = Mat4::from_cols_array_2d(&t.projection) * Mat4::from_cols_array_2d(&t.view);
        let center = smv_core::math::project_point(matrix, Vec3::ZERO);
        assert_abs_diff_eq!(center.x, 0.0, epsilon = 1e-5);
        assert_abs_diff_eq!(center.y, 0.0, epsilon = 1e-5);
        assert!((0.0..1.0).contains(&center.z));
    }
}
