//! Projection helpers for Vulkan clip space.
//!
//! All projections here target a left-handed view space (+Z forward,
//! +Y up) and map depth into `[0, 1]`, which is what Vulkan expects.

use glam::{Mat4, Vec3, Vec4};

/// Flip the Y axis so that +Y in view space ends up at the top of the screen.
///
/// Vulkan clip space has Y pointing down, unlike OpenGL.
#[inline]
pub fn vulkan_clip_correction() -> Mat4 {
    Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
}

/// Width over height, falling back to `1.0` for a degenerate extent.
#[inline]
pub fn aspect_ratio(width: u32, height: u32) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// Off-centre perspective frustum.
///
/// `left`, `right`, `bottom` and `top` are measured on the near plane.
/// Points on the near plane map to depth 0 and points on the far plane
/// map to depth 1.
pub fn frustum_lh(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Mat4 {
    let width = right - left;
    let height = top - bottom;
    let depth = far - near;

    Mat4::from_cols(
        Vec4::new(2.0 * near / width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 2.0 * near / height, 0.0, 0.0),
        Vec4::new(
            -(right + left) / width,
            -(top + bottom) / height,
            far / depth,
            1.0,
        ),
        Vec4::new(0.0, 0.0, -far * near / depth, 0.0),
    )
}

/// Symmetric perspective projection with the Vulkan Y flip applied.
///
/// A non-finite or non-positive aspect ratio is replaced with `1.0` so a
/// minimized window never produces NaNs.
pub fn perspective_vk(fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let aspect = if aspect.is_finite() && aspect > 0.0 {
        aspect
    } else {
        1.0
    };
    vulkan_clip_correction() * Mat4::perspective_lh(fov_y_radians, aspect, near, far)
}

/// Project a point and return its normalized device coordinates.
#[inline]
pub fn project_point(matrix: Mat4, point: Vec3) -> Vec3 {
    let clip = matrix * point.extend(1.0);
    clip.truncate() / clip.w
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn assert_mat4_eq(a: Mat4, b: Mat4) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert_relative_eq!(x, y, epsilon = 1e-5);
        }
    }

    #[test]
    fn frustum_maps_near_and_far_planes() {
        let proj = frustum_lh(-2.0, 2.0, -2.0, 2.0, 1.0, 100.0);

        let near = project_point(proj, Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(near.z, 0.0, epsilon = 1e-6);

        let far = project_point(proj, Vec3::new(0.0, 0.0, 100.0));
        assert_relative_eq!(far.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn frustum_maps_near_corners_to_ndc_corners() {
        let proj = frustum_lh(-2.0, 2.0, -2.0, 2.0, 1.0, 100.0);

        let corner = project_point(proj, Vec3::new(2.0, 2.0, 1.0));
        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(corner.y, 1.0, epsilon = 1e-6);

        // The same ray further away lands on the same NDC position.
        let far_corner = project_point(proj, Vec3::new(20.0, 20.0, 10.0));
        assert_relative_eq!(far_corner.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(far_corner.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn off_centre_frustum_shifts_the_image() {
        let proj = frustum_lh(0.0, 4.0, -2.0, 2.0, 1.0, 100.0);

        let centre = project_point(proj, Vec3::new(0.0, 0.0, 1.0));
        assert_relative_eq!(centre.x, -1.0, epsilon = 1e-6);
        assert_relative_eq!(centre.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn symmetric_frustum_matches_glam_perspective() {
        let near: f32 = 1.0;
        let top = 2.0;
        let right = 3.0;
        let fov = 2.0 * (top / near).atan();

        let ours = frustum_lh(-right, right, -top, top, near, 50.0);
        let glams = Mat4::perspective_lh(fov, right / top, near, 50.0);
        assert_mat4_eq(ours, glams);
    }

    #[test]
    fn clip_correction_flips_y() {
        let proj = perspective_vk(std::f32::consts::FRAC_PI_2, 1.0, 0.1, 100.0);
        let above = project_point(proj, Vec3::new(0.0, 1.0, 5.0));
        assert!(above.y < 0.0, "points above the centre must have negative NDC y");
    }

    #[test]
    fn degenerate_aspect_is_sanitized() {
        let proj = perspective_vk(1.0, f32::NAN, 0.1, 100.0);
        assert!(proj.to_cols_array().iter().all(|v| v.is_finite()));
        assert_mat4_eq(proj, perspective_vk(1.0, 1.0, 0.1, 100.0));
    }

    #[test]
    fn aspect_ratio_handles_zero_extent() {
        assert_relative_eq!(aspect_ratio(800, 600), 4.0 / 3.0);
        assert_relative_eq!(aspect_ratio(800, 0), 1.0);
        assert_relative_eq!(aspect_ratio(0, 600), 1.0);
    }
}
