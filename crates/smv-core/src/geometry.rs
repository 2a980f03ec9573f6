//! Hardcoded geometry drawn by the tutorial programs.

use crate::vertex::{ColorVertex, TexturedVertex};

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];

/// Two horizontal quads: a red one at `y = 0` and a blue one at `y = 1`.
///
/// Seen from below, the red quad is closer and partially hides the blue one,
/// which makes the depth test visible.
pub const PERSPECTIVE_QUADS: [ColorVertex; 8] = [
    ColorVertex::new([3.0, 0.0, -2.0], RED),
    ColorVertex::new([3.0, 0.0, 2.0], RED),
    ColorVertex::new([-1.0, 0.0, -2.0], RED),
    ColorVertex::new([-1.0, 0.0, 2.0], RED),
    ColorVertex::new([1.0, 1.0, -2.0], BLUE),
    ColorVertex::new([1.0, 1.0, 2.0], BLUE),
    ColorVertex::new([-3.0, 1.0, -2.0], BLUE),
    ColorVertex::new([-3.0, 1.0, 2.0], BLUE),
];

/// Index list for [`PERSPECTIVE_QUADS`], blue quad first.
pub const PERSPECTIVE_QUAD_INDICES: [u16; 12] = [4, 5, 6, 5, 7, 6, 0, 1, 2, 1, 3, 2];

/// Unit quad lying in the XZ plane, facing +Y.
pub const TEXTURED_QUAD: [TexturedVertex; 4] = [
    TexturedVertex::new([-1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 0.0]),
    TexturedVertex::new([-1.0, 0.0, -1.0], [1.0, 0.0, 0.0], [0.0, 1.0]),
    TexturedVertex::new([1.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 1.0]),
    TexturedVertex::new([1.0, 0.0, 1.0], [0.0, 0.0, 1.0], [1.0, 0.0]),
];

/// Index list for [`TEXTURED_QUAD`].
pub const TEXTURED_QUAD_INDICES: [u16; 6] = [0, 1, 3, 1, 2, 3];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_stay_in_range() {
        assert!(PERSPECTIVE_QUAD_INDICES
            .iter()
            .all(|&i| usize::from(i) < PERSPECTIVE_QUADS.len()));
        assert!(TEXTURED_QUAD_INDICES
            .iter()
            .all(|&i| usize::from(i) < TEXTURED_QUAD.len()));
    }

    #[test]
    fn index_lists_are_whole_triangles() {
        assert_eq!(PERSPECTIVE_QUAD_INDICES.len() % 3, 0);
        assert_eq!(TEXTURED_QUAD_INDICES.len() % 3, 0);
    }

    #[test]
    fn red_quad_is_in_front_of_blue_quad() {
        assert!(PERSPECTIVE_QUADS[..4].iter().all(|v| v.position[1] == 0.0));
        assert!(PERSPECTIVE_QUADS[4..].iter().all(|v| v.position[1] == 1.0));
        assert!(PERSPECTIVE_QUADS[..4].iter().all(|v| v.color == RED));
    }

    #[test]
    fn textured_quad_is_flat_in_xz() {
        assert!(TEXTURED_QUAD.iter().all(|v| v.position[1] == 0.0));
    }
}
