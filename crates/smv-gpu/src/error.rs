//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// Vulkan error.
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// No suitable GPU found.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// Required extension not supported.
    #[error("Required extension not supported: {0}")]
    ExtensionNotSupported(String),

    /// Memory allocation failed.
    #[error("Memory allocation failed: {0}")]
    AllocationFailed(String),

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Swapchain creation failed.
    #[error("Swapchain creation failed: {0}")]
    SwapchainCreation(String),

    /// Shader module creation or loading failed.
    #[error("Shader error: {0}")]
    ShaderCompilation(String),

    /// Pipeline creation failed.
    #[error("Pipeline creation failed: {0}")]
    PipelineCreation(String),

    /// No candidate format supports the requested features.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl GpuError {
    /// Whether the swapchain no longer matches the surface and must be recreated.
    pub fn is_out_of_date(&self) -> bool {
        matches!(self, Self::Vulkan(vk::Result::ERROR_OUT_OF_DATE_KHR))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_is_recognised() {
        assert!(GpuError::from(vk::Result::ERROR_OUT_OF_DATE_KHR).is_out_of_date());
        assert!(!GpuError::from(vk::Result::ERROR_DEVICE_LOST).is_out_of_date());
        assert!(!GpuError::NoSuitableDevice.is_out_of_date());
    }
}
