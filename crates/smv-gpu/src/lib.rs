//! Vulkan bootstrap and object helpers for the Simple Vulkan Engine.
//!
//! This crate provides:
//! - Instance, debug messenger and device selection
//! - GPU capability detection
//! - Memory allocation via gpu-allocator
//! - Command buffers, synchronization and frames-in-flight bookkeeping
//! - Surface and swapchain handling
//! - Pipelines, descriptors, staging uploads, textures and depth buffers

pub mod barrier;
pub mod capabilities;
pub mod command;
pub mod context;
pub mod debug;
pub mod descriptors;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod rendering;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod upload;
pub mod vertex;

pub use barrier::{
    cmd_host_read_barrier, host_read_barrier, transition_image_layout, transition_masks,
};
pub use capabilities::{GpuCapabilities, GpuVendor};
pub use command::{execute_single_time_commands, CommandPool};
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_combined_image_sampler, write_storage_buffer, write_storage_image,
    write_uniform_buffer, DescriptorPool, DescriptorSetLayoutBuilder,
};
pub use error::{GpuError, Result};
pub use instance::AdapterInfo;
pub use memory::{GpuAllocator, GpuBuffer, GpuImage};
pub use pipeline::{load_spirv, ComputePipeline, GraphicsPipeline, GraphicsPipelineConfig};
pub use queue::QueueFamilyIndices;
pub use rendering::{begin_rendering, end_rendering, set_full_viewport, ColorTarget, DepthTarget};
pub use surface::{SurfaceCapabilities, SurfaceContext, WindowHandles};
pub use swapchain::Swapchain;
pub use sync::{create_fence, create_semaphore, InFlightTracker};
pub use texture::{find_depth_format, has_stencil_component, DepthBuffer, Texture};
pub use upload::{create_device_local_buffer, update_device_local_buffer};
pub use vertex::VertexLayout;

pub use gpu_allocator::MemoryLocation;
