//! Staging uploads into device-local memory.

use crate::command::{execute_single_time_commands, CommandPool};
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuBuffer;
use ash::vk;
use gpu_allocator::MemoryLocation;

/// Create a host-visible buffer holding `bytes`, ready to be copied from.
pub fn create_staging_buffer(gpu: &GpuContext, bytes: &[u8], name: &str) -> Result<GpuBuffer> {
    if bytes.is_empty() {
        return Err(GpuError::InvalidState(format!(
            "refusing to stage zero bytes for '{name}'"
        )));
    }

    let mut allocator = gpu.allocator().lock();
    let mut staging = allocator.create_buffer(
        bytes.len() as u64,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
        name,
    )?;

    if let Err(e) = staging.write_bytes(0, bytes) {
        allocator.free_buffer(&mut staging)?;
        return Err(e);
    }

    Ok(staging)
}

/// Run `record` with a filled staging buffer, then free the staging buffer.
fn with_staging<F>(
    gpu: &GpuContext,
    pool: &CommandPool,
    queue: vk::Queue,
    bytes: &[u8],
    name: &str,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer, vk::Buffer) -> Result<()>,
{
    let mut staging = create_staging_buffer(gpu, bytes, name)?;
    let src = staging.buffer;

    let result = unsafe {
        execute_single_time_commands(gpu.device(), pool, queue, |cmd| record(cmd, src))
    };

    gpu.allocator().lock().free_buffer(&mut staging)?;
    result
}

/// Create a GPU-only buffer with `usage` and fill it with `bytes` via staging.
///
/// Blocks until the copy has finished.
pub fn create_device_local_buffer(
    gpu: &GpuContext,
    pool: &CommandPool,
    queue: vk::Queue,
    usage: vk::BufferUsageFlags,
    bytes: &[u8],
    name: &str,
) -> Result<GpuBuffer> {
    if bytes.is_empty() {
        return Err(GpuError::InvalidState(format!(
            "buffer '{name}' would be empty"
        )));
    }

    let mut buffer = gpu.allocator().lock().create_buffer(
        bytes.len() as u64,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryLocation::GpuOnly,
        name,
    )?;

    if let Err(e) = update_device_local_buffer(gpu, pool, queue, &buffer, bytes) {
        gpu.allocator().lock().free_buffer(&mut buffer)?;
        return Err(e);
    }

    tracing::debug!("Uploaded '{name}' ({} bytes)", bytes.len());
    Ok(buffer)
}

/// Overwrite the start of a device-local buffer with `bytes` via staging.
///
/// The buffer must have been created with `TRANSFER_DST` usage. Blocks until
/// the copy has finished.
pub fn update_device_local_buffer(
    gpu: &GpuContext,
    pool: &CommandPool,
    queue: vk::Queue,
    dst: &GpuBuffer,
    bytes: &[u8],
) -> Result<()> {
    if bytes.is_empty() {
        return Err(GpuError::InvalidState("update with zero bytes".into()));
    }
    if bytes.len() as u64 > dst.size {
        return Err(GpuError::InvalidState(format!(
            "update of {} bytes exceeds buffer size {}",
            bytes.len(),
            dst.size
        )));
    }

    let dst_buffer = dst.buffer;
    let size = bytes.len() as u64;
    with_staging(gpu, pool, queue, bytes, "staging", |cmd, src| {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            gpu.device()
                .cmd_copy_buffer(cmd, src, dst_buffer, std::slice::from_ref(&region));
        }
        Ok(())
    })
}

/// Upload tightly packed pixels into a 2D color image via staging.
///
/// `record_copy` receives the command buffer and staging buffer and is
/// expected to transition the image and record the copy.
pub fn upload_image_data<F>(
    gpu: &GpuContext,
    pool: &CommandPool,
    queue: vk::Queue,
    pixels: &[u8],
    record_copy: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer, vk::Buffer) -> Result<()>,
{
    with_staging(gpu, pool, queue, pixels, "image staging", record_copy)
}

/// Record a copy of a whole buffer into mip 0 of a color image in
/// `TRANSFER_DST_OPTIMAL` layout.
///
/// # Safety
/// All handles must be valid and `cmd` must be recording.
pub unsafe fn cmd_copy_buffer_to_image(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    buffer: vk::Buffer,
    image: vk::Image,
    extent: vk::Extent2D,
) {
    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(color_layers())
        .image_offset(vk::Offset3D::default())
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });

    unsafe {
        device.cmd_copy_buffer_to_image(
            cmd,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            std::slice::from_ref(&region),
        );
    }
}

/// Record a copy of mip 0 of a color image in `TRANSFER_SRC_OPTIMAL` layout
/// into a buffer.
///
/// # Safety
/// All handles must be valid and `cmd` must be recording.
pub unsafe fn cmd_copy_image_to_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    extent: vk::Extent2D,
    buffer: vk::Buffer,
) {
    let region = vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(color_layers())
        .image_offset(vk::Offset3D::default())
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        });

    unsafe {
        device.cmd_copy_image_to_buffer(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            buffer,
            std::slice::from_ref(&region),
        );
    }
}

fn color_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}
