//! A compute pipeline with one descriptor set and a push constant block.

use ash::vk;
use smv_gpu::{ComputePipeline, DescriptorPool, DescriptorSetLayoutBuilder, GpuError};

/// Owns every object needed to dispatch a single-set compute shader.
/// Everything is destroyed on drop.
pub struct Kernel<'a> {
    device: &'a ash::Device,
    set_layout: vk::DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    pipeline: ComputePipeline,
    set: vk::DescriptorSet,
}

impl<'a> Kernel<'a> {
    /// Build the set layout, pool, pipeline and the one descriptor set.
    /// Whatever was created is destroyed again if a later step fails.
    ///
    /// # Safety
    /// `code` must be valid SPIR-V matching `bindings` and `push_size`.
    pub unsafe fn new(
        device: &'a ash::Device,
        code: &[u32],
        bindings: &DescriptorSetLayoutBuilder<'_>,
        push_size: u32,
    ) -> smv_gpu::Result<Self> {
        let set_layout = unsafe { bindings.build(device)? };
        let descriptor_pool =
            match unsafe { DescriptorPool::new(device, 1, &bindings.pool_sizes(1)) } {
                Ok(pool) => pool,
                Err(e) => {
                    unsafe { device.destroy_descriptor_set_layout(set_layout, None) };
                    return Err(e);
                }
            };

        let built =
            unsafe { set_and_pipeline(device, &descriptor_pool, set_layout, code, push_size) };
        match built {
            Ok((set, pipeline)) => Ok(Self {
                device,
                set_layout,
                descriptor_pool,
                pipeline,
                set,
            }),
            Err(e) => {
                // SAFETY: nothing has been submitted with these objects
                unsafe {
                    descriptor_pool.destroy(device);
                    device.destroy_descriptor_set_layout(set_layout, None);
                }
                Err(e)
            }
        }
    }

    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }

    /// Bind, push `constants` and dispatch `groups` workgroups.
    ///
    /// # Safety
    /// `cmd` must be recording and the descriptor set must be written.
    pub unsafe fn cmd_dispatch(&self, cmd: vk::CommandBuffer, constants: &[u8], groups: [u32; 3]) {
        let device = self.device;
        let pipeline = &self.pipeline;
        unsafe {
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::COMPUTE,
                pipeline.layout,
                0,
                &[self.set],
                &[],
            );
            device.cmd_push_constants(
                cmd,
                pipeline.layout,
                vk::ShaderStageFlags::COMPUTE,
                0,
                constants,
            );
            device.cmd_dispatch(cmd, groups[0], groups[1], groups[2]);
        }
    }
}

/// # Safety
/// `pool` must have room for one set of `set_layout`.
unsafe fn set_and_pipeline(
    device: &ash::Device,
    pool: &DescriptorPool,
    set_layout: vk::DescriptorSetLayout,
    code: &[u32],
    push_size: u32,
) -> smv_gpu::Result<(vk::DescriptorSet, ComputePipeline)> {
    let set = unsafe { pool.allocate(device, &[set_layout])? }
        .into_iter()
        .next()
        .ok_or_else(|| GpuError::InvalidState("descriptor pool returned no set".into()))?;

    let push_range = vk::PushConstantRange::default()
        .stage_flags(vk::ShaderStageFlags::COMPUTE)
        .offset(0)
        .size(push_size);
    let pipeline = unsafe { ComputePipeline::new(device, code, &[set_layout], &[push_range])? };
    Ok((set, pipeline))
}

impl Drop for Kernel<'_> {
    fn drop(&mut self) {
        // SAFETY: the one-time submits wait for the queue to drain
        unsafe {
            self.pipeline.destroy(self.device);
            self.descriptor_pool.destroy(self.device);
            self.device
                .destroy_descriptor_set_layout(self.set_layout, None);
        }
    }
}
