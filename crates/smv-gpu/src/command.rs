//! Command pools, recording and queue submission.

use ash::vk;

use crate::error::{GpuError, Result};

/// Pool of primary command buffers for one queue family.
pub struct CommandPool {
    pool: vk::CommandPool,
    queue_family: u32,
}

impl CommandPool {
    /// # Safety
    /// The device must be valid and `queue_family` one of its families.
    pub unsafe fn new(
        device: &ash::Device,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family)
            .flags(flags);
        let pool = unsafe { device.create_command_pool(&info, None)? };
        Ok(Self { pool, queue_family })
    }

    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Allocate `count` primary command buffers.
    ///
    /// # Safety
    /// The device must be the one the pool was created from.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        count: u32,
    ) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        Ok(unsafe { device.allocate_command_buffers(&info)? })
    }

    /// # Safety
    /// The device must be the one the pool was created from.
    pub unsafe fn allocate_one(&self, device: &ash::Device) -> Result<vk::CommandBuffer> {
        unsafe { self.allocate(device, 1)? }
            .pop()
            .ok_or_else(|| GpuError::InvalidState("driver returned no command buffer".into()))
    }

    /// # Safety
    /// No buffer from this pool may still be pending.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_command_pool(self.pool, None) };
    }
}

/// # Safety
/// `cmd` must be in the initial state.
pub unsafe fn begin_command_buffer(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    flags: vk::CommandBufferUsageFlags,
) -> Result<()> {
    let info = vk::CommandBufferBeginInfo::default().flags(flags);
    unsafe { device.begin_command_buffer(cmd, &info)? };
    Ok(())
}

/// # Safety
/// `cmd` must be recording.
pub unsafe fn end_command_buffer(device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe { device.end_command_buffer(cmd)? };
    Ok(())
}

/// Submit recorded command buffers with `vkQueueSubmit2`.
///
/// Each wait pairs a binary semaphore with the stages that must not start
/// before it is signaled. Signals fire once every command has completed.
///
/// # Safety
/// All handles must be valid and the buffers fully recorded.
pub unsafe fn submit_command_buffers(
    device: &ash::Device,
    queue: vk::Queue,
    command_buffers: &[vk::CommandBuffer],
    waits: &[(vk::Semaphore, vk::PipelineStageFlags2)],
    signals: &[vk::Semaphore],
    fence: vk::Fence,
) -> Result<()> {
    let buffer_infos: Vec<_> = command_buffers
        .iter()
        .map(|&cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd))
        .collect();
    let wait_infos: Vec<_> = waits
        .iter()
        .map(|&(semaphore, stages)| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(stages)
        })
        .collect();
    let signal_infos: Vec<_> = signals
        .iter()
        .map(|&semaphore| {
            vk::SemaphoreSubmitInfo::default()
                .semaphore(semaphore)
                .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        })
        .collect();

    let submit = vk::SubmitInfo2::default()
        .command_buffer_infos(&buffer_infos)
        .wait_semaphore_infos(&wait_infos)
        .signal_semaphore_infos(&signal_infos);

    unsafe { device.queue_submit2(queue, &[submit], fence)? };
    Ok(())
}

/// Record `record` into a fresh buffer, submit it and wait for the queue to
/// drain. The buffer is freed whether or not recording succeeded.
///
/// # Safety
/// All handles must be valid and the pool must belong to the queue's family.
pub unsafe fn execute_single_time_commands<F>(
    device: &ash::Device,
    pool: &CommandPool,
    queue: vk::Queue,
    record: F,
) -> Result<()>
where
    F: FnOnce(vk::CommandBuffer) -> Result<()>,
{
    let cmd = unsafe { pool.allocate_one(device)? };

    let outcome = (|| unsafe {
        begin_command_buffer(device, cmd, vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        record(cmd)?;
        end_command_buffer(device, cmd)?;
        submit_command_buffers(device, queue, &[cmd], &[], &[], vk::Fence::null())?;
        device.queue_wait_idle(queue)?;
        Ok(())
    })();

    unsafe { device.free_command_buffers(pool.handle(), &[cmd]) };
    outcome
}
