//! Apply a colour filter to an image with a compute shader.

use anyhow::{bail, Context as _};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use smv_core::ImageData;
use smv_gpu::texture::{create_image_2d, create_image_view};
use smv_gpu::upload::{cmd_copy_buffer_to_image, cmd_copy_image_to_buffer, upload_image_data};
use smv_gpu::{
    cmd_host_read_barrier, execute_single_time_commands, load_spirv, transition_image_layout,
    write_storage_image, CommandPool, DescriptorSetLayoutBuilder, GpuContext, GpuImage,
    MemoryLocation,
};
use tracing::info;

use crate::args::FilterOptions;
use crate::kernel::Kernel;

/// `local_size_x` and `local_size_y` of the shader.
pub const WORKGROUP_SIZE: u32 = 16;
/// Edge length of the generated input image.
pub const DEFAULT_SIZE: u32 = 512;
/// Largest per-channel difference tolerated against the CPU result.
pub const TOLERANCE: u8 = 1;

/// Storage images cannot be sRGB, so the raw bytes are processed as UNORM.
const IMAGE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Push constants of the filter shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FilterParams {
    filter_id: u32,
    width: u32,
    height: u32,
}

/// Workgroups needed to cover an image.
pub fn workgroup_count(width: u32, height: u32) -> [u32; 3] {
    [
        width.div_ceil(WORKGROUP_SIZE),
        height.div_ceil(WORKGROUP_SIZE),
        1,
    ]
}

/// Load the input image, or build the default checkerboard.
pub fn load_input(options: &FilterOptions) -> anyhow::Result<ImageData> {
    match &options.input {
        Some(path) => ImageData::load(path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(ImageData::checkerboard(
            DEFAULT_SIZE,
            DEFAULT_SIZE,
            DEFAULT_SIZE / 8,
            [230, 90, 40, 255],
            [40, 140, 220, 255],
        )),
    }
}

pub fn run(gpu: &GpuContext, pool: &CommandPool, options: &FilterOptions) -> anyhow::Result<()> {
    let input = load_input(options)?;
    let code = match &options.shader {
        Some(path) => load_spirv(path)?,
        None => smv_shaders::filter_comp().to_vec(),
    };

    let extent = vk::Extent2D {
        width: input.width,
        height: input.height,
    };
    let mut image = create_image_2d(
        gpu,
        extent,
        IMAGE_FORMAT,
        vk::ImageUsageFlags::STORAGE
            | vk::ImageUsageFlags::TRANSFER_DST
            | vk::ImageUsageFlags::TRANSFER_SRC,
        "filter image",
    )?;

    let result = filter_on_gpu(gpu, pool, &image, &input, &code, options);
    gpu.allocator().lock().free_image(&mut image)?;
    let output = result?;

    let expected = options.filter.apply_cpu(&input);
    match output.max_channel_difference(&expected) {
        Some(diff) if diff <= TOLERANCE => {}
        Some(diff) => bail!(
            "{} filter differs from the CPU result by {diff}",
            options.filter.name()
        ),
        None => bail!("filtered image has the wrong size"),
    }

    output
        .save_png(&options.output)
        .with_context(|| format!("failed to write {}", options.output.display()))?;

    info!(
        "filter: {} applied to {}x{} image, written to {}",
        options.filter.name(),
        output.width,
        output.height,
        options.output.display()
    );
    Ok(())
}

fn filter_on_gpu(
    gpu: &GpuContext,
    pool: &CommandPool,
    image: &GpuImage,
    input: &ImageData,
    code: &[u32],
    options: &FilterOptions,
) -> anyhow::Result<ImageData> {
    let device = gpu.device();
    let queue = gpu.compute_queue();
    let extent = vk::Extent2D {
        width: input.width,
        height: input.height,
    };
    let target = image.image;

    // SAFETY: the image was created with this format
    let view =
        unsafe { create_image_view(device, target, IMAGE_FORMAT, vk::ImageAspectFlags::COLOR)? };

    let mut readback = match gpu.allocator().lock().create_buffer(
        input.byte_len(),
        vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuToCpu,
        "filter readback",
    ) {
        Ok(buffer) => buffer,
        Err(e) => {
            // SAFETY: nothing uses the view yet
            unsafe { device.destroy_image_view(view, None) };
            return Err(e.into());
        }
    };

    let result = (|| -> anyhow::Result<ImageData> {
        upload_image_data(gpu, pool, queue, &input.pixels, |cmd, staging| unsafe {
            transition_image_layout(
                device,
                cmd,
                target,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            cmd_copy_buffer_to_image(device, cmd, staging, target, extent);
            transition_image_layout(
                device,
                cmd,
                target,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::GENERAL,
            )
        })?;

        // SAFETY: the shader declares one storage image and `FilterParams`
        let kernel = unsafe {
            Kernel::new(
                device,
                code,
                &DescriptorSetLayoutBuilder::new().storage_image(0, vk::ShaderStageFlags::COMPUTE),
                std::mem::size_of::<FilterParams>() as u32,
            )?
        };
        // SAFETY: the set and view are valid
        unsafe { write_storage_image(device, kernel.set(), 0, view, vk::ImageLayout::GENERAL) };

        let params = FilterParams {
            filter_id: options.filter.id(),
            width: extent.width,
            height: extent.height,
        };
        let groups = workgroup_count(extent.width, extent.height);
        let readback_buffer = readback.buffer;

        // SAFETY: the pool belongs to the compute queue family
        unsafe {
            execute_single_time_commands(device, pool, queue, |cmd| {
                kernel.cmd_dispatch(cmd, bytemuck::bytes_of(&params), groups);
                transition_image_layout(
                    device,
                    cmd,
                    target,
                    vk::ImageAspectFlags::COLOR,
                    vk::ImageLayout::GENERAL,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                )?;
                cmd_copy_image_to_buffer(device, cmd, target, extent, readback_buffer);
                cmd_host_read_barrier(
                    device,
                    cmd,
                    vk::PipelineStageFlags2::TRANSFER,
                    vk::AccessFlags2::TRANSFER_WRITE,
                );
                Ok(())
            })?;
        }

        let pixels = readback.read::<u8>(input.pixels.len())?;
        Ok(ImageData::new(extent.width, extent.height, pixels)?)
    })();

    gpu.allocator().lock().free_buffer(&mut readback)?;
    // SAFETY: the queue is idle after the one-time submits
    unsafe { device.destroy_image_view(view, None) };

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroups_round_up() {
        assert_eq!(workgroup_count(512, 512), [32, 32, 1]);
        assert_eq!(workgroup_count(17, 1), [2, 1, 1]);
    }

    #[test]
    fn default_input_is_a_checkerboard() {
        let input = load_input(&FilterOptions::default()).unwrap();
        assert_eq!((input.width, input.height), (DEFAULT_SIZE, DEFAULT_SIZE));
        assert_ne!(input.pixel(0, 0), input.pixel(DEFAULT_SIZE / 8, 0));
    }

    #[test]
    fn missing_input_is_an_error() {
        let options = FilterOptions {
            input: Some("does/not/exist.png".into()),
            ..FilterOptions::default()
        };
        assert!(load_input(&options).is_err());
    }

    #[test]
    fn params_match_the_shader_block() {
        assert_eq!(std::mem::size_of::<FilterParams>(), 12);
    }
}
