//! Core types, math, and image data for the Simple Vulkan Engine tutorials.
//!
//! This crate holds everything that does not touch the GPU:
//! - Error types
//! - Projection helpers for Vulkan clip space
//! - Vertex and uniform layouts shared with the shaders
//! - Hardcoded tutorial geometry
//! - RGBA image data and CPU reference filters

pub mod error;
pub mod geometry;
pub mod image_data;
pub mod math;
pub mod uniforms;
pub mod vertex;

pub use error::{Error, Result};
pub use image_data::{Filter, ImageData};
pub use uniforms::TransformUniforms;
pub use vertex::{ColorVertex, TexturedVertex};

/// Constants shared by every tutorial program.
pub mod constants {
    /// Engine name reported to the Vulkan driver.
    pub const ENGINE_NAME: &str = "Simple Vulkan Engine";
    /// Default window width.
    pub const WINDOW_WIDTH: u32 = 800;
    /// Default window height.
    pub const WINDOW_HEIGHT: u32 = 600;
    /// Number of frames the CPU may record ahead of the GPU.
    pub const MAX_FRAMES_IN_FLIGHT: usize = 2;
}
