//! Uniform buffer layouts.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Model, view and projection matrices for the vertex shaders.
///
/// Three column-major `mat4`s, which is already std140 compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformUniforms {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl TransformUniforms {
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }

    /// Size in bytes as seen by the GPU.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;
}

impl Default for TransformUniforms {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn size_matches_three_mat4() {
        assert_eq!(TransformUniforms::SIZE, 192);
    }

    #[test]
    fn matrices_are_column_major() {
        let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
        let uniforms = TransformUniforms::new(model, Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(uniforms.model[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniforms.view, Mat4::IDENTITY.to_cols_array_2d());
    }
}
