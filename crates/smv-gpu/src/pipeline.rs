//! Pipeline creation and shader loading.

use std::path::Path;

use ash::vk;

use crate::error::{GpuError, Result};

const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Read a SPIR-V binary from disk.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u32>> {
    let path = path.as_ref();
    let shader_error = |what: &str, e: std::io::Error| {
        GpuError::ShaderCompilation(format!("{what} {}: {e}", path.display()))
    };

    let mut file = std::fs::File::open(path).map_err(|e| shader_error("cannot open", e))?;
    let code = ash::util::read_spv(&mut file).map_err(|e| shader_error("bad SPIR-V in", e))?;
    tracing::debug!("Loaded {} ({} words)", path.display(), code.len());
    Ok(code)
}

/// Shader module that lives only for the duration of pipeline creation.
struct TransientModule<'a> {
    device: &'a ash::Device,
    handle: vk::ShaderModule,
}

impl<'a> TransientModule<'a> {
    /// # Safety
    /// The device must be valid.
    unsafe fn new(device: &'a ash::Device, code: &[u32]) -> Result<Self> {
        if code.is_empty() {
            return Err(GpuError::ShaderCompilation("empty shader code".into()));
        }
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        let handle = unsafe { device.create_shader_module(&info, None) }
            .map_err(|e| GpuError::ShaderCompilation(e.to_string()))?;
        Ok(Self { device, handle })
    }

    fn stage(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(stage)
            .module(self.handle)
            .name(ENTRY_POINT)
    }
}

impl Drop for TransientModule<'_> {
    fn drop(&mut self) {
        // SAFETY: pipelines keep no reference to their modules once created
        unsafe { self.device.destroy_shader_module(self.handle, None) };
    }
}

/// # Safety
/// The device must be valid.
unsafe fn create_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
    push_ranges: &[vk::PushConstantRange],
) -> Result<vk::PipelineLayout> {
    let info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_ranges);
    unsafe { device.create_pipeline_layout(&info, None) }
        .map_err(|e| GpuError::PipelineCreation(e.to_string()))
}

/// Take the single pipeline out of a create call, releasing `layout` on
/// failure.
///
/// # Safety
/// `layout` must have been created from `device` and be otherwise unused.
unsafe fn take_single(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    created: std::result::Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>,
) -> Result<vk::Pipeline> {
    let pipeline = match created {
        Ok(pipelines) => pipelines.into_iter().next(),
        Err((_, e)) => {
            unsafe { device.destroy_pipeline_layout(layout, None) };
            return Err(GpuError::PipelineCreation(e.to_string()));
        }
    };
    pipeline.ok_or_else(|| {
        unsafe { device.destroy_pipeline_layout(layout, None) };
        GpuError::PipelineCreation("driver returned no pipeline".into())
    })
}

/// # Safety
/// The device must be valid and the handles unused by the GPU.
unsafe fn destroy_pair(device: &ash::Device, pipeline: vk::Pipeline, layout: vk::PipelineLayout) {
    unsafe {
        device.destroy_pipeline(pipeline, None);
        device.destroy_pipeline_layout(layout, None);
    }
}

/// Compute pipeline and its layout.
pub struct ComputePipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl ComputePipeline {
    /// # Safety
    /// The device must be valid and `code` must be a compute shader whose
    /// interface matches the layouts.
    pub unsafe fn new(
        device: &ash::Device,
        code: &[u32],
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let module = unsafe { TransientModule::new(device, code)? };
        let layout = unsafe { create_layout(device, set_layouts, push_ranges)? };

        let info = vk::ComputePipelineCreateInfo::default()
            .stage(module.stage(vk::ShaderStageFlags::COMPUTE))
            .layout(layout);
        let pipeline = unsafe {
            take_single(
                device,
                layout,
                device.create_compute_pipelines(vk::PipelineCache::null(), &[info], None),
            )?
        };

        tracing::debug!("Compute pipeline created");
        Ok(Self { pipeline, layout })
    }

    /// # Safety
    /// The pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { destroy_pair(device, self.pipeline, self.layout) };
    }
}

/// Fixed-function state and attachment formats of a graphics pipeline.
///
/// Viewport and scissor are always dynamic. Rendering uses dynamic
/// rendering, so formats take the place of a render pass.
#[derive(Clone)]
pub struct GraphicsPipelineConfig {
    pub vertex_shader: Vec<u32>,
    pub fragment_shader: Vec<u32>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: vk::PrimitiveTopology,
    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub color_formats: Vec<vk::Format>,
    pub depth_format: Option<vk::Format>,
}

impl Default for GraphicsPipelineConfig {
    fn default() -> Self {
        Self {
            vertex_shader: Vec::new(),
            fragment_shader: Vec::new(),
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            depth_test: false,
            depth_write: false,
            color_formats: vec![vk::Format::B8G8R8A8_SRGB],
            depth_format: None,
        }
    }
}

impl GraphicsPipelineConfig {
    /// Enable depth testing and writing against `format`.
    pub fn with_depth(mut self, format: vk::Format) -> Self {
        self.depth_test = true;
        self.depth_write = true;
        self.depth_format = Some(format);
        self
    }

    fn rasterization(&self) -> vk::PipelineRasterizationStateCreateInfo<'static> {
        vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(1.0)
    }

    fn depth_stencil(&self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
    }

    /// One opaque, write-all blend state per color attachment.
    fn blend_attachments(&self) -> Vec<vk::PipelineColorBlendAttachmentState> {
        let opaque = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        vec![opaque; self.color_formats.len()]
    }
}

/// Graphics pipeline and its layout.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// # Safety
    /// The device must be valid and the shaders must be valid SPIR-V whose
    /// interfaces match the layouts.
    pub unsafe fn new(
        device: &ash::Device,
        config: &GraphicsPipelineConfig,
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let vertex = unsafe { TransientModule::new(device, &config.vertex_shader)? };
        let fragment = unsafe { TransientModule::new(device, &config.fragment_shader)? };
        let stages = [
            vertex.stage(vk::ShaderStageFlags::VERTEX),
            fragment.stage(vk::ShaderStageFlags::FRAGMENT),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&config.vertex_bindings)
            .vertex_attribute_descriptions(&config.vertex_attributes);
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(config.topology);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = config.rasterization();
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = config.depth_stencil();
        let attachments = config.blend_attachments();
        let blend = vk::PipelineColorBlendStateCreateInfo::default().attachments(&attachments);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let mut formats = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&config.color_formats);
        if let Some(depth) = config.depth_format {
            formats = formats.depth_attachment_format(depth);
        }

        let layout = unsafe { create_layout(device, set_layouts, push_ranges)? };
        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&blend)
            .dynamic_state(&dynamic)
            .layout(layout)
            .push_next(&mut formats);

        let pipeline = unsafe {
            take_single(
                device,
                layout,
                device.create_graphics_pipelines(vk::PipelineCache::null(), &[info], None),
            )?
        };

        tracing::debug!(
            "Graphics pipeline created ({} vertex attributes, depth: {:?})",
            config.vertex_attributes.len(),
            config.depth_format
        );
        Ok(Self { pipeline, layout })
    }

    /// # Safety
    /// The pipeline must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        unsafe { destroy_pair(device, self.pipeline, self.layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_spirv_file_is_a_shader_error() {
        let result = load_spirv("/definitely/not/here.spv");
        assert!(matches!(result, Err(GpuError::ShaderCompilation(_))));
    }

    #[test]
    fn spirv_is_read_from_disk() {
        let path = std::env::temp_dir().join(format!("smv-gpu-test-{}.spv", std::process::id()));
        let words: [u32; 5] = [0x0723_0203, 0x0001_0600, 0, 1, 0];
        std::fs::write(&path, bytemuck::cast_slice::<u32, u8>(&words)).unwrap();

        let code = load_spirv(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(code, words);
    }

    #[test]
    fn truncated_spirv_is_rejected() {
        let path =
            std::env::temp_dir().join(format!("smv-gpu-test-short-{}.spv", std::process::id()));
        std::fs::write(&path, [0x03, 0x02, 0x23]).unwrap();

        let result = load_spirv(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }

    #[test]
    fn depth_is_opt_in() {
        let config = GraphicsPipelineConfig::default();
        assert!(config.depth_format.is_none());

        let config = config.with_depth(vk::Format::D32_SFLOAT);
        assert!(config.depth_test && config.depth_write);
        assert_eq!(config.depth_format, Some(vk::Format::D32_SFLOAT));
    }
}
