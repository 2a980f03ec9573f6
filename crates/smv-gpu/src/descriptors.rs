//! Descriptor set layouts, pools and writes.

use ash::vk;

use crate::error::Result;

/// Collects single-descriptor bindings for one set layout.
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding holding one descriptor of `ty`.
    pub fn binding(
        mut self,
        binding: u32,
        ty: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(binding)
                .descriptor_type(ty)
                .descriptor_count(1)
                .stage_flags(stages),
        );
        self
    }

    pub fn storage_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_BUFFER, stages)
    }

    pub fn uniform_buffer(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::UNIFORM_BUFFER, stages)
    }

    pub fn storage_image(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::STORAGE_IMAGE, stages)
    }

    pub fn combined_image_sampler(self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.binding(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stages)
    }

    /// Pool sizes needed to allocate `sets` sets of this layout.
    pub fn pool_sizes(&self, sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for binding in &self.bindings {
            let count = binding.descriptor_count * sets;
            match sizes.iter_mut().find(|s| s.ty == binding.descriptor_type) {
                Some(size) => size.descriptor_count += count,
                None => sizes.push(vk::DescriptorPoolSize {
                    ty: binding.descriptor_type,
                    descriptor_count: count,
                }),
            }
        }
        sizes
    }

    /// # Safety
    /// The device must be valid.
    pub unsafe fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&self.bindings);
        Ok(unsafe { device.create_descriptor_set_layout(&info, None)? })
    }
}

/// Fixed-size descriptor pool. Sets are never freed individually.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// # Safety
    /// The device must be valid.
    pub unsafe fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Self> {
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&info, None)? };
        Ok(Self { pool })
    }

    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Allocate one set per entry of `layouts`.
    ///
    /// # Safety
    /// The device must be the one the pool was created from.
    pub unsafe fn allocate(
        &self,
        device: &ash::Device,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<vk::DescriptorSet>> {
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        Ok(unsafe { device.allocate_descriptor_sets(&info)? })
    }

    /// Return every set to the pool.
    ///
    /// # Safety
    /// No set from this pool may be in use.
    pub unsafe fn reset(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())? };
        Ok(())
    }

    /// # Safety
    /// No set from this pool may be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { device.destroy_descriptor_pool(self.pool, None) };
    }
}

unsafe fn write_buffer(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    info: vk::DescriptorBufferInfo,
) {
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(ty)
        .buffer_info(std::slice::from_ref(&info));
    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

unsafe fn write_image(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    info: vk::DescriptorImageInfo,
) {
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(ty)
        .image_info(std::slice::from_ref(&info));
    unsafe { device.update_descriptor_sets(&[write], &[]) };
}

/// Point a uniform buffer binding at `range` bytes of `buffer`.
///
/// # Safety
/// Device, set and buffer must be valid and the set not in use.
pub unsafe fn write_uniform_buffer(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let info = vk::DescriptorBufferInfo { buffer, offset, range };
    unsafe { write_buffer(device, set, binding, vk::DescriptorType::UNIFORM_BUFFER, info) };
}

/// # Safety
/// Device, set and buffer must be valid and the set not in use.
pub unsafe fn write_storage_buffer(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    buffer: vk::Buffer,
    offset: u64,
    range: u64,
) {
    let info = vk::DescriptorBufferInfo { buffer, offset, range };
    unsafe { write_buffer(device, set, binding, vk::DescriptorType::STORAGE_BUFFER, info) };
}

/// Bind a storage image view that will be in `layout` when the shader runs.
///
/// # Safety
/// Device, set and view must be valid and the set not in use.
pub unsafe fn write_storage_image(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
    layout: vk::ImageLayout,
) {
    let info = vk::DescriptorImageInfo::default()
        .image_view(view)
        .image_layout(layout);
    unsafe { write_image(device, set, binding, vk::DescriptorType::STORAGE_IMAGE, info) };
}

/// Bind a sampled texture in `SHADER_READ_ONLY_OPTIMAL`.
///
/// # Safety
/// Device, set, view and sampler must be valid and the set not in use.
pub unsafe fn write_combined_image_sampler(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let info = vk::DescriptorImageInfo::default()
        .image_view(view)
        .sampler(sampler)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    unsafe { write_image(device, set, binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, info) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_bindings_in_order() {
        let builder = DescriptorSetLayoutBuilder::new()
            .uniform_buffer(0, vk::ShaderStageFlags::VERTEX)
            .combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT);

        let kinds: Vec<_> = builder
            .bindings
            .iter()
            .map(|b| (b.binding, b.descriptor_type, b.stage_flags))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (
                    0,
                    vk::DescriptorType::UNIFORM_BUFFER,
                    vk::ShaderStageFlags::VERTEX
                ),
                (
                    1,
                    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                    vk::ShaderStageFlags::FRAGMENT
                ),
            ]
        );
        assert!(builder.bindings.iter().all(|b| b.descriptor_count == 1));
    }

    #[test]
    fn pool_sizes_merge_by_type() {
        let builder = DescriptorSetLayoutBuilder::new()
            .storage_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .uniform_buffer(2, vk::ShaderStageFlags::COMPUTE);

        let sizes: Vec<_> = builder
            .pool_sizes(3)
            .iter()
            .map(|s| (s.ty, s.descriptor_count))
            .collect();
        assert_eq!(
            sizes,
            vec![
                (vk::DescriptorType::STORAGE_BUFFER, 6),
                (vk::DescriptorType::UNIFORM_BUFFER, 3),
            ]
        );
    }
}
