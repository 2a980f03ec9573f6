//! Sampled textures, depth buffers and format queries.

use crate::barrier::transition_image_layout;
use crate::command::CommandPool;
use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::memory::GpuImage;
use crate::upload::{cmd_copy_buffer_to_image, upload_image_data};
use ash::vk;
use gpu_allocator::MemoryLocation;
use smv_core::ImageData;

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate whose properties (as reported by `properties_of`)
/// support `features` for `tiling`.
pub fn pick_supported_format<P>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties_of: P,
) -> Result<vk::Format>
where
    P: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties_of(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| {
            GpuError::UnsupportedFormat(format!(
                "none of {candidates:?} supports {features:?} with {tiling:?} tiling"
            ))
        })
}

/// Query the device for the first candidate format that supports `features`.
///
/// # Safety
/// The instance and physical device must be valid.
pub unsafe fn find_supported_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> Result<vk::Format> {
    pick_supported_format(candidates, tiling, features, |format| unsafe {
        instance.get_physical_device_format_properties(physical_device, format)
    })
}

/// Best depth format usable as an optimally tiled depth attachment.
pub fn find_depth_format(gpu: &GpuContext) -> Result<vk::Format> {
    unsafe {
        find_supported_format(
            gpu.instance(),
            gpu.physical_device(),
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Aspect flags a barrier on a depth image of `format` must cover.
pub fn depth_barrier_aspect(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Allocate a single-mip 2D image.
pub fn create_image_2d(
    gpu: &GpuContext,
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    name: &str,
) -> Result<GpuImage> {
    if extent.width == 0 || extent.height == 0 {
        return Err(GpuError::InvalidState(format!(
            "image '{name}' must have a non-zero extent"
        )));
    }

    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    gpu.allocator()
        .lock()
        .create_image(&image_info, MemoryLocation::GpuOnly, name)
}

/// Create a 2D view over mip 0 of `image`.
///
/// # Safety
/// The device and image must be valid.
pub unsafe fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.create_image_view(&view_info, None)? };
    Ok(view)
}

/// A sampled RGBA texture with its view and sampler.
pub struct Texture {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
    pub extent: vk::Extent2D,
}

impl Texture {
    /// Format used for color textures.
    pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

    /// Upload `data` into a new texture in `SHADER_READ_ONLY_OPTIMAL` layout.
    pub fn from_image_data(
        gpu: &GpuContext,
        pool: &CommandPool,
        queue: vk::Queue,
        data: &ImageData,
        name: &str,
    ) -> Result<Self> {
        let extent = vk::Extent2D {
            width: data.width,
            height: data.height,
        };

        let mut image = create_image_2d(
            gpu,
            extent,
            Self::FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            name,
        )?;

        match Self::fill(gpu, pool, queue, &image, extent, data) {
            Ok((view, sampler)) => {
                tracing::debug!("Texture '{name}' created ({}x{})", extent.width, extent.height);
                Ok(Self {
                    image,
                    view,
                    sampler,
                    extent,
                })
            }
            Err(e) => {
                gpu.allocator().lock().free_image(&mut image)?;
                Err(e)
            }
        }
    }

    fn fill(
        gpu: &GpuContext,
        pool: &CommandPool,
        queue: vk::Queue,
        image: &GpuImage,
        extent: vk::Extent2D,
        data: &ImageData,
    ) -> Result<(vk::ImageView, vk::Sampler)> {
        let device = gpu.device();
        let handle = image.image;

        upload_image_data(gpu, pool, queue, &data.pixels, |cmd, staging| unsafe {
            transition_image_layout(
                device,
                cmd,
                handle,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            cmd_copy_buffer_to_image(device, cmd, staging, handle, extent);
            transition_image_layout(
                device,
                cmd,
                handle,
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        })?;

        let view = unsafe {
            create_image_view(device, handle, Self::FORMAT, vk::ImageAspectFlags::COLOR)?
        };

        let sampler_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = match unsafe { device.create_sampler(&sampler_info, None) } {
            Ok(sampler) => sampler,
            Err(e) => {
                unsafe { device.destroy_image_view(view, None) };
                return Err(e.into());
            }
        };

        Ok((view, sampler))
    }

    /// Destroy the sampler, view and image.
    ///
    /// # Safety
    /// The texture must not be in use by the GPU.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        unsafe {
            gpu.device().destroy_sampler(self.sampler, None);
            gpu.device().destroy_image_view(self.view, None);
        }
        gpu.allocator().lock().free_image(&mut self.image)
    }
}

/// A GPU-only depth attachment sized to the swapchain.
pub struct DepthBuffer {
    pub image: GpuImage,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Create a depth buffer using [`find_depth_format`].
    pub fn new(gpu: &GpuContext, extent: vk::Extent2D) -> Result<Self> {
        let format = find_depth_format(gpu)?;
        Self::with_format(gpu, extent, format)
    }

    /// Create a depth buffer with an explicit format.
    pub fn with_format(gpu: &GpuContext, extent: vk::Extent2D, format: vk::Format) -> Result<Self> {
        let mut image = create_image_2d(
            gpu,
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "depth buffer",
        )?;

        // Attachments only need the depth aspect in the view.
        let view = match unsafe {
            create_image_view(gpu.device(), image.image, format, vk::ImageAspectFlags::DEPTH)
        } {
            Ok(view) => view,
            Err(e) => {
                gpu.allocator().lock().free_image(&mut image)?;
                return Err(e);
            }
        };

        tracing::debug!(
            "Depth buffer created: {}x{} {format:?}",
            extent.width,
            extent.height
        );

        Ok(Self {
            image,
            view,
            format,
            extent,
        })
    }

    /// Aspect to use in layout transitions.
    pub fn barrier_aspect(&self) -> vk::ImageAspectFlags {
        depth_barrier_aspect(self.format)
    }

    /// Record the per-frame transition into `DEPTH_STENCIL_ATTACHMENT_OPTIMAL`.
    ///
    /// # Safety
    /// `cmd` must be recording.
    pub unsafe fn cmd_prepare(&self, device: &ash::Device, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe {
            transition_image_layout(
                device,
                cmd,
                self.image.image,
                self.barrier_aspect(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            )
        }
    }

    /// Destroy the view and image.
    ///
    /// # Safety
    /// The depth buffer must not be in use by the GPU.
    pub unsafe fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        unsafe { gpu.device().destroy_image_view(self.view, None) };
        gpu.allocator().lock().free_image(&mut self.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimal(features: vk::FormatFeatureFlags) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: features,
            ..Default::default()
        }
    }

    #[test]
    fn first_supported_candidate_wins() {
        let picked = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| {
                if format == vk::Format::D32_SFLOAT {
                    optimal(vk::FormatFeatureFlags::empty())
                } else {
                    optimal(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
                }
            },
        )
        .unwrap();
        assert_eq!(picked, vk::Format::D32_SFLOAT_S8_UINT);
    }

    #[test]
    fn tiling_selects_the_feature_set() {
        let props = |_| vk::FormatProperties {
            linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        };
        let features = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;

        assert!(pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::LINEAR,
            features,
            props
        )
        .is_ok());
        assert!(matches!(
            pick_supported_format(
                &DEPTH_FORMAT_CANDIDATES,
                vk::ImageTiling::OPTIMAL,
                features,
                props
            ),
            Err(GpuError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn stencil_formats() {
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));

        assert_eq!(
            depth_barrier_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            depth_barrier_aspect(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
    }
}
