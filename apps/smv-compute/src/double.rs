//! Double every element of a storage buffer on the GPU.

use anyhow::bail;
use ash::vk;
use smv_gpu::{
    cmd_host_read_barrier, execute_single_time_commands, write_storage_buffer, CommandPool,
    DescriptorSetLayoutBuilder, GpuBuffer, GpuContext, MemoryLocation,
};
use tracing::info;

use crate::kernel::Kernel;

/// Number of values processed.
pub const ITEMS: usize = 64 * 1024;
/// `local_size_x` of the shader.
pub const WORKGROUP_SIZE: u32 = 64;
pub const INITIAL_VALUE: i32 = 4;

/// Workgroups needed to cover `items` values.
pub fn workgroup_count(items: usize) -> u32 {
    (items as u32).div_ceil(WORKGROUP_SIZE)
}

/// First index whose value is not twice the initial value.
pub fn first_mismatch(values: &[i32]) -> Option<(usize, i32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .find(|&(_, value)| value != INITIAL_VALUE * 2)
}

pub fn run(gpu: &GpuContext, pool: &CommandPool) -> anyhow::Result<()> {
    let size = (ITEMS * std::mem::size_of::<i32>()) as u64;
    let mut buffer = gpu.allocator().lock().create_buffer(
        size,
        vk::BufferUsageFlags::STORAGE_BUFFER,
        MemoryLocation::CpuToGpu,
        "double values",
    )?;

    let result = dispatch(gpu, pool, &buffer);
    gpu.allocator().lock().free_buffer(&mut buffer)?;
    let values = result?;

    if let Some((index, value)) = first_mismatch(&values) {
        bail!(
            "value {index} is {value}, expected {}",
            INITIAL_VALUE * 2
        );
    }

    info!(
        "double: {ITEMS} values doubled from {INITIAL_VALUE} to {}",
        INITIAL_VALUE * 2
    );
    Ok(())
}

fn dispatch(gpu: &GpuContext, pool: &CommandPool, buffer: &GpuBuffer) -> anyhow::Result<Vec<i32>> {
    buffer.write(&vec![INITIAL_VALUE; ITEMS])?;

    let device = gpu.device();
    // SAFETY: the embedded shader declares one storage buffer and a u32 push constant
    let kernel = unsafe {
        Kernel::new(
            device,
            smv_shaders::double_comp(),
            &DescriptorSetLayoutBuilder::new().storage_buffer(0, vk::ShaderStageFlags::COMPUTE),
            std::mem::size_of::<u32>() as u32,
        )?
    };

    // SAFETY: the set and buffer are valid
    unsafe { write_storage_buffer(device, kernel.set(), 0, buffer.buffer, 0, buffer.size) };

    let count = ITEMS as u32;
    let groups = workgroup_count(ITEMS);
    // SAFETY: the pool belongs to the compute queue family
    unsafe {
        execute_single_time_commands(device, pool, gpu.compute_queue(), |cmd| {
            kernel.cmd_dispatch(cmd, bytemuck::bytes_of(&count), [groups, 1, 1]);
            cmd_host_read_barrier(
                device,
                cmd,
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_STORAGE_WRITE,
            );
            Ok(())
        })?;
    }

    Ok(buffer.read::<i32>(ITEMS)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_every_item() {
        assert_eq!(workgroup_count(ITEMS), 1024);
        assert_eq!(workgroup_count(65), 2);
    }

    #[test]
    fn mismatch_is_reported() {
        let mut values = vec![8; 16];
        assert_eq!(first_mismatch(&values), None);

        values[3] = 4;
        values[9] = 0;
        assert_eq!(first_mismatch(&values), Some((3, 4)));
    }
}
