//! Vertex layouts shared with the GLSL shaders.

use bytemuck::{Pod, Zeroable};

/// Vertex with a position and a per-vertex colour.
///
/// Matches `layout(location = 0) in vec3` / `layout(location = 1) in vec3`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl ColorVertex {
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }
}

/// Vertex with position, colour and texture coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub tex_coord: [f32; 2],
}

impl TexturedVertex {
    pub const fn new(position: [f32; 3], color: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_are_tightly_packed() {
        assert_eq!(std::mem::size_of::<ColorVertex>(), 24);
        assert_eq!(std::mem::size_of::<TexturedVertex>(), 32);
        assert_eq!(std::mem::offset_of!(TexturedVertex, tex_coord), 24);
    }

    #[test]
    fn vertices_cast_to_bytes() {
        let vertices = [ColorVertex::new([1.0, 2.0, 3.0], [0.0, 0.5, 1.0])];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &1.0f32.to_ne_bytes());
    }
}
