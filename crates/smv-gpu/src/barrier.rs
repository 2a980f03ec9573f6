//! Image layout transitions and host readback barriers with synchronization2.

use crate::error::{GpuError, Result};
use ash::vk;

/// Stage and access masks on both sides of a layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// Masks for a supported `old -> new` layout pair.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Result<TransitionMasks> {
    use vk::AccessFlags2 as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags2 as S;

    let (src_stage, src_access, dst_stage, dst_access) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (S::TOP_OF_PIPE, A::NONE, S::TRANSFER, A::TRANSFER_WRITE)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            S::TRANSFER,
            A::TRANSFER_WRITE,
            S::FRAGMENT_SHADER | S::COMPUTE_SHADER,
            A::SHADER_READ,
        ),
        (L::UNDEFINED, L::GENERAL) => (
            S::TOP_OF_PIPE,
            A::NONE,
            S::COMPUTE_SHADER,
            A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::GENERAL) => (
            S::TRANSFER,
            A::TRANSFER_WRITE,
            S::COMPUTE_SHADER,
            A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE,
        ),
        (L::GENERAL, L::TRANSFER_SRC_OPTIMAL) => (
            S::COMPUTE_SHADER,
            A::SHADER_STORAGE_WRITE,
            S::TRANSFER,
            A::TRANSFER_READ,
        ),
        // The source stage matches the acquire semaphore's wait stage.
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::NONE,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::BOTTOM_OF_PIPE,
            A::NONE,
        ),
        (L::PRESENT_SRC_KHR, L::TRANSFER_SRC_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::TRANSFER,
            A::TRANSFER_READ,
        ),
        (L::TRANSFER_SRC_OPTIMAL, L::PRESENT_SRC_KHR) => {
            (S::TRANSFER, A::TRANSFER_READ, S::BOTTOM_OF_PIPE, A::NONE)
        }
        // The depth buffer is shared by all frames, so wait for the previous writer.
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => (
            S::LATE_FRAGMENT_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS,
            A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        _ => {
            return Err(GpuError::InvalidState(format!(
                "unsupported layout transition {old:?} -> {new:?}"
            )))
        }
    };

    Ok(TransitionMasks {
        src_stage,
        src_access,
        dst_stage,
        dst_access,
    })
}

/// Record a layout transition for mip 0, layer 0 of `image`.
///
/// # Safety
/// The device and image must be valid and `cmd` must be recording.
pub unsafe fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<()> {
    let masks = transition_masks(old, new)?;

    let barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(masks.src_stage)
        .src_access_mask(masks.src_access)
        .dst_stage_mask(masks.dst_stage)
        .dst_access_mask(masks.dst_access)
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let dependency_info =
        vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(&barrier));

    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    Ok(())
}

/// Global barrier making writes from `src_stage` visible to host reads of
/// mapped memory.
pub fn host_read_barrier(
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
) -> vk::MemoryBarrier2<'static> {
    vk::MemoryBarrier2::default()
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(vk::PipelineStageFlags2::HOST)
        .dst_access_mask(vk::AccessFlags2::HOST_READ)
}

/// Record a [`host_read_barrier`]. Needed before the CPU reads a buffer the
/// GPU wrote, even after a fence or queue wait.
///
/// # Safety
/// `cmd` must be recording.
pub unsafe fn cmd_host_read_barrier(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
) {
    let barrier = host_read_barrier(src_stage, src_access);
    let dependency_info =
        vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&barrier));

    unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn upload_path() {
        let masks = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(masks.src_access, vk::AccessFlags2::NONE);
        assert_eq!(masks.dst_access, vk::AccessFlags2::TRANSFER_WRITE);

        let masks =
            transition_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(masks.src_stage, vk::PipelineStageFlags2::TRANSFER);
        assert!(masks
            .dst_stage
            .contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert_eq!(masks.dst_access, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn compute_readback_path() {
        let masks = transition_masks(L::GENERAL, L::TRANSFER_SRC_OPTIMAL).unwrap();
        assert_eq!(masks.src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(masks.src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(masks.dst_access, vk::AccessFlags2::TRANSFER_READ);
    }

    #[test]
    fn present_path() {
        let acquire = transition_masks(L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(
            acquire.src_stage,
            vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT
        );

        let present = transition_masks(L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR).unwrap();
        assert_eq!(present.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(present.dst_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn screenshot_round_trip_is_supported() {
        assert!(transition_masks(L::PRESENT_SRC_KHR, L::TRANSFER_SRC_OPTIMAL).is_ok());
        assert!(transition_masks(L::TRANSFER_SRC_OPTIMAL, L::PRESENT_SRC_KHR).is_ok());
    }

    #[test]
    fn depth_waits_for_previous_writes() {
        let masks =
            transition_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(
            masks.src_access,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert!(masks
            .dst_stage
            .contains(vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS));
    }

    #[test]
    fn unknown_pairs_are_rejected() {
        let result = transition_masks(L::SHADER_READ_ONLY_OPTIMAL, L::UNDEFINED);
        assert!(matches!(result, Err(GpuError::InvalidState(_))));
    }

    #[test]
    fn host_reads_wait_for_device_writes() {
        let barrier = host_read_barrier(
            vk::PipelineStageFlags2::COMPUTE_SHADER,
            vk::AccessFlags2::SHADER_STORAGE_WRITE,
        );
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::HOST);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::HOST_READ);

        let copy = host_read_barrier(
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
        );
        assert_eq!(copy.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(copy.dst_access_mask, vk::AccessFlags2::HOST_READ);
    }
}
