//! GPU memory management on top of gpu-allocator.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};

use crate::error::{GpuError, Result};

fn allocation_error(e: impl std::fmt::Display) -> GpuError {
    GpuError::AllocationFailed(e.to_string())
}

/// Owns the gpu-allocator instance for one logical device.
///
/// Shut down (or dropped) before the device is destroyed.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// # Safety
    /// The instance, device and physical device must be valid and related.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: AllocatorDebugSettings {
                log_memory_information: cfg!(debug_assertions),
                log_leaks_on_shutdown: true,
                ..AllocatorDebugSettings::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(allocation_error)?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    /// Allocate memory for `requirements`. `release` runs when allocation
    /// fails, so the caller's object does not leak.
    fn allocate(
        &mut self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
        release: impl FnOnce(&ash::Device),
    ) -> Result<Allocation> {
        let result = match self.allocator.as_mut() {
            Some(allocator) => allocator
                .allocate(&AllocationCreateDesc {
                    name,
                    requirements,
                    location,
                    linear,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(allocation_error),
            None => Err(GpuError::InvalidState("allocator already shut down".into())),
        };
        if result.is_err() {
            release(&self.device);
        }
        result
    }

    fn release(&mut self, allocation: Option<Allocation>) -> Result<()> {
        let Some(allocation) = allocation else {
            return Ok(());
        };
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("allocator already shut down".into()))?
            .free(allocation)
            .map_err(allocation_error)
    }

    /// Create a buffer and bind fresh memory to it. Zero-sized buffers are
    /// rejected.
    pub fn create_buffer(
        &mut self,
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuBuffer> {
        if size == 0 {
            return Err(GpuError::AllocationFailed(format!("buffer '{name}' has zero size")));
        }

        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        // SAFETY: the device outlives the allocator
        let buffer = unsafe { self.device.create_buffer(&info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation = self.allocate(name, requirements, location, true, |device| unsafe {
            device.destroy_buffer(buffer, None);
        })?;
        // SAFETY: the memory handle is only used to bind this allocation
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        let mut created = GpuBuffer {
            buffer,
            allocation: Some(allocation),
            size,
        };

        // SAFETY: the allocation satisfies the buffer's requirements
        if let Err(e) = unsafe { self.device.bind_buffer_memory(buffer, memory, offset) } {
            self.free_buffer(&mut created)?;
            return Err(e.into());
        }

        tracing::trace!("Allocated buffer '{name}' ({size} bytes, {location:?})");
        Ok(created)
    }

    /// Free the buffer's memory and destroy it. Safe to call twice.
    pub fn free_buffer(&mut self, buffer: &mut GpuBuffer) -> Result<()> {
        self.release(buffer.allocation.take())?;
        if buffer.buffer != vk::Buffer::null() {
            // SAFETY: the caller guarantees the GPU is done with the buffer
            unsafe { self.device.destroy_buffer(buffer.buffer, None) };
            buffer.buffer = vk::Buffer::null();
        }
        Ok(())
    }

    /// Create an image from `info` and bind fresh memory to it.
    pub fn create_image(
        &mut self,
        info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        name: &str,
    ) -> Result<GpuImage> {
        // SAFETY: the device outlives the allocator
        let image = unsafe { self.device.create_image(info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let linear = info.tiling == vk::ImageTiling::LINEAR;
        let allocation = self.allocate(name, requirements, location, linear, |device| unsafe {
            device.destroy_image(image, None);
        })?;
        // SAFETY: the memory handle is only used to bind this allocation
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        let mut created = GpuImage {
            image,
            allocation: Some(allocation),
            format: info.format,
            extent: info.extent,
        };

        // SAFETY: the allocation satisfies the image's requirements
        if let Err(e) = unsafe { self.device.bind_image_memory(image, memory, offset) } {
            self.free_image(&mut created)?;
            return Err(e.into());
        }

        tracing::trace!(
            "Allocated image '{name}' ({}x{}, {:?})",
            info.extent.width,
            info.extent.height,
            info.format
        );
        Ok(created)
    }

    /// Free the image's memory and destroy it. Safe to call twice.
    pub fn free_image(&mut self, image: &mut GpuImage) -> Result<()> {
        self.release(image.allocation.take())?;
        if image.image != vk::Image::null() {
            // SAFETY: the caller guarantees the GPU is done with the image
            unsafe { self.device.destroy_image(image.image, None) };
            image.image = vk::Image::null();
        }
        Ok(())
    }

    /// Drop the underlying allocator. Remaining allocations are reported
    /// as leaks.
    pub fn shutdown(&mut self) {
        self.allocator = None;
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Buffer plus the memory bound to it.
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: u64,
}

impl GpuBuffer {
    /// Host pointer to the buffer's memory, for CpuToGpu and GpuToCpu
    /// buffers.
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|p| p.as_ptr().cast::<u8>())
    }

    /// Mapped pointer to `len` bytes at `offset`, bounds-checked.
    fn mapped_range(&self, offset: u64, len: usize) -> Result<*mut u8> {
        let ptr = self
            .mapped_ptr()
            .ok_or_else(|| GpuError::InvalidState("buffer is not host visible".into()))?;
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(GpuError::InvalidState(format!(
                "{len} bytes at offset {offset} do not fit in a {} byte buffer",
                self.size
            )));
        }
        // SAFETY: offset is within the mapping
        Ok(unsafe { ptr.add(offset as usize) })
    }

    /// Copy `data` to the start of the buffer.
    pub fn write<T: Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Copy raw bytes into the buffer at `offset`.
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let dst = self.mapped_range(offset, data.len())?;
        // SAFETY: mapped_range checked that the destination holds data.len() bytes
        unsafe { std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        Ok(())
    }

    /// Read `count` elements from the start of the buffer.
    pub fn read<T: Pod>(&self, count: usize) -> Result<Vec<T>> {
        let len = count
            .checked_mul(std::mem::size_of::<T>())
            .ok_or_else(|| GpuError::InvalidState("read size overflows".into()))?;
        let src = self.mapped_range(0, len)?;

        let mut out = vec![T::zeroed(); count];
        // SAFETY: the source holds len bytes and T is Pod
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.cast_const(),
                bytemuck::cast_slice_mut::<T, u8>(&mut out).as_mut_ptr(),
                len,
            );
        }
        Ok(out)
    }
}

/// Image plus the memory bound to it.
pub struct GpuImage {
    pub image: vk::Image,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unmapped(size: u64) -> GpuBuffer {
        GpuBuffer {
            buffer: vk::Buffer::null(),
            allocation: None,
            size,
        }
    }

    #[test]
    fn device_local_buffers_reject_host_access() {
        let buffer = unmapped(64);
        assert!(buffer.mapped_ptr().is_none());
        assert!(matches!(
            buffer.write(&[[1.0f32, 2.0, 3.0, 4.0]]),
            Err(GpuError::InvalidState(_))
        ));
        assert!(matches!(buffer.read::<u32>(4), Err(GpuError::InvalidState(_))));
    }

    #[test]
    fn oversized_reads_are_rejected() {
        assert!(matches!(
            unmapped(16).read::<u64>(usize::MAX),
            Err(GpuError::InvalidState(_))
        ));
    }
}
