//! Synchronization primitives and frames-in-flight bookkeeping.

use crate::error::{GpuError, Result};
use ash::vk;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.create_semaphore(&create_info, None)? };
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.create_fence(&create_info, None)? };
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout_ns: u64,
) -> Result<()> {
    unsafe { device.wait_for_fences(&[fence], true, timeout_ns)? };
    Ok(())
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    unsafe { device.reset_fences(&[fence])? };
    Ok(())
}

/// Tracks which frame slot is current and which fence last used each
/// swapchain image.
///
/// Swapchain images can come back out of order, so an image may still be
/// in use by a different frame slot than the one about to render into it.
#[derive(Debug, Clone)]
pub struct InFlightTracker<F> {
    frames_in_flight: usize,
    current: usize,
    images_in_flight: Vec<Option<F>>,
}

impl<F: Copy + PartialEq> InFlightTracker<F> {
    /// Create a tracker for `frames_in_flight` slots over `image_count` images.
    pub fn new(frames_in_flight: usize, image_count: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(GpuError::InvalidState(
                "at least one frame in flight is required".into(),
            ));
        }

        Ok(Self {
            frames_in_flight,
            current: 0,
            images_in_flight: vec![None; image_count],
        })
    }

    /// Index of the frame slot being recorded.
    pub fn current_frame(&self) -> usize {
        self.current
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Record that `fence` now owns `image_index`.
    ///
    /// Returns the previous owner when it is a different fence, which the
    /// caller must wait on before touching the image.
    pub fn claim_image(&mut self, image_index: u32, fence: F) -> Result<Option<F>> {
        let count = self.images_in_flight.len();
        let slot = self
            .images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| {
                GpuError::InvalidState(format!(
                    "image index {image_index} out of range for {count} images"
                ))
            })?;

        let previous = slot.replace(fence);
        Ok(previous.filter(|&owner| owner != fence))
    }

    /// Move to the next frame slot.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames_in_flight;
    }

    /// Forget every image owner, after the swapchain was recreated.
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight.clear();
        self.images_in_flight.resize(image_count, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_frames_is_rejected() {
        assert!(InFlightTracker::<u32>::new(0, 3).is_err());
    }

    #[test]
    fn frame_index_wraps() {
        let mut tracker = InFlightTracker::<u32>::new(2, 3).unwrap();
        let seen: Vec<usize> = (0..5)
            .map(|_| {
                let frame = tracker.current_frame();
                tracker.advance();
                frame
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 0, 1, 0]);
    }

    #[test]
    fn single_frame_in_flight_stays_at_zero() {
        let mut tracker = InFlightTracker::<u32>::new(1, 2).unwrap();
        tracker.advance();
        tracker.advance();
        assert_eq!(tracker.current_frame(), 0);
    }

    #[test]
    fn claiming_returns_other_owner() {
        let mut tracker = InFlightTracker::new(2, 3).unwrap();
        assert_eq!(tracker.claim_image(1, 10u32).unwrap(), None);
        assert_eq!(tracker.claim_image(1, 20).unwrap(), Some(10));
        assert_eq!(tracker.claim_image(1, 20).unwrap(), None);
    }

    #[test]
    fn out_of_order_images() {
        // Frame 0 gets image 2, frame 1 gets image 0, frame 0 again gets image 0.
        let fences = [100u32, 200];
        let mut tracker = InFlightTracker::new(2, 3).unwrap();

        let f = fences[tracker.current_frame()];
        assert_eq!(tracker.claim_image(2, f).unwrap(), None);
        tracker.advance();

        let f = fences[tracker.current_frame()];
        assert_eq!(tracker.claim_image(0, f).unwrap(), None);
        tracker.advance();

        let f = fences[tracker.current_frame()];
        assert_eq!(tracker.claim_image(0, f).unwrap(), Some(200));
    }

    #[test]
    fn reset_forgets_owners() {
        let mut tracker = InFlightTracker::new(2, 2).unwrap();
        tracker.claim_image(0, 1u32).unwrap();
        tracker.reset_images(4);
        assert_eq!(tracker.image_count(), 4);
        assert_eq!(tracker.claim_image(0, 2).unwrap(), None);
        assert_eq!(tracker.claim_image(3, 2).unwrap(), None);
    }

    #[test]
    fn out_of_range_image_is_an_error() {
        let mut tracker = InFlightTracker::new(2, 2).unwrap();
        assert!(matches!(
            tracker.claim_image(2, 1u32),
            Err(GpuError::InvalidState(_))
        ));
    }
}
