//! Pure matrix math: projection, view, orbit, and billboard extraction.
//!
//! All matrices are column-major `glam::Mat4`. Nothing in here keeps state;
//! callers own every matrix and decide when to recompute it.

use glam::{Mat3, Mat4, Vec3, Vec4, Vec4Swizzles};
use std::f32::consts::PI;

/// Below this, a basis vector is treated as zero length.
const DEGENERATE_EPSILON: f32 = 1e-6;

/// Caller-input contract violations. These are returned, never clamped.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("invalid projection range: near={near}, far={far} (need 0 < near < far)")]
    InvalidProjectionRange { near: f32, far: f32 },
    #[error("invalid field of view: {0} rad (need 0 < fov < pi)")]
    InvalidFieldOfView(f32),
    #[error("invalid aspect ratio: {0}")]
    InvalidAspectRatio(f32),
    #[error("degenerate camera basis: forward is zero or parallel to up")]
    DegenerateBasis,
}

/// Right-handed perspective projection with a [0, 1] depth range.
pub fn perspective(fov_radians: f32, aspect: f32, near: f32, far: f32) -> Result<Mat4, TransformError> {
    if !(near.is_finite() && far.is_finite() && near > 0.0 && near < far) {
        return Err(TransformError::InvalidProjectionRange { near, far });
    }
    if !(fov_radians > 0.0 && fov_radians < PI) {
        return Err(TransformError::InvalidFieldOfView(fov_radians));
    }
    if !(aspect.is_finite() && aspect > 0.0) {
        return Err(TransformError::InvalidAspectRatio(aspect));
    }
    Ok(Mat4::perspective_rh(fov_radians, aspect, near, far))
}

/// Right-handed view matrix looking from `eye` towards `target`.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Result<Mat4, TransformError> {
    if !(eye.is_finite() && target.is_finite() && up.is_finite()) {
        return Err(TransformError::DegenerateBasis);
    }
    let offset = target - eye;
    if offset.length() <= DEGENERATE_EPSILON || up.length() <= DEGENERATE_EPSILON {
        return Err(TransformError::DegenerateBasis);
    }
    let forward = offset.normalize();
    let side = forward.cross(up);
    if side.length() <= DEGENERATE_EPSILON * up.length() {
        return Err(TransformError::DegenerateBasis);
    }
    let right = side.normalize();
    let true_up = right.cross(forward);

    Ok(Mat4::from_cols(
        Vec4::new(right.x, true_up.x, -forward.x, 0.0),
        Vec4::new(right.y, true_up.y, -forward.y, 0.0),
        Vec4::new(right.z, true_up.z, -forward.z, 0.0),
        Vec4::new(-right.dot(eye), -true_up.dot(eye), forward.dot(eye), 1.0),
    ))
}

/// Rotates the eye of `base_view` about the vertical axis through `pivot`.
///
/// Always derived from the stored base view, so repeated recomputes never
/// accumulate error. `orbit(v, p, 0.0) == v` exactly.
pub fn orbit(base_view: Mat4, pivot: Vec3, angle_radians: f32) -> Mat4 {
    // Moving the eye by +angle is the same as turning the world by -angle.
    let world_turn = Mat4::from_translation(pivot)
        * Mat4::from_rotation_y(-angle_radians)
        * Mat4::from_translation(-pivot);
    base_view * world_turn
}

/// World-space eye position encoded in a view matrix.
pub fn eye_position(view: Mat4) -> Vec3 {
    view.inverse().w_axis.xyz()
}

/// `projection * view * model`.
pub fn model_view_projection(model: Mat4, view: Mat4, projection: Mat4) -> Mat4 {
    projection * view * model
}

/// Transforms a point to normalized device coordinates (after the divide by w).
pub fn project_point(mvp: Mat4, point: Vec3) -> Vec3 {
    mvp.project_point3(point)
}

/// True when no entry of `m` is NaN or infinite.
pub fn is_finite(m: &Mat4) -> bool {
    m.is_finite()
}

/// The 3x3 rotation part of a model matrix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationBlock(pub Mat3);

impl RotationBlock {
    pub const IDENTITY: Self = Self(Mat3::IDENTITY);

    /// Rotation block currently stored in `m`.
    pub fn of(m: &Mat4) -> Self {
        Self(Mat3::from_mat4(*m))
    }

    /// Overwrites rows 0..3 of columns 0..3. The translation column and the
    /// bottom row of `model` are left exactly as they were.
    pub fn apply_to(&self, model: &mut Mat4) {
        model.x_axis = self.0.x_axis.extend(model.x_axis.w);
        model.y_axis = self.0.y_axis.extend(model.y_axis.w);
        model.z_axis = self.0.z_axis.extend(model.z_axis.w);
    }
}

/// Camera orientation in world space: the rotation block of `inverse(view)`.
///
/// Written into a model matrix it makes the surface face the camera. View
/// matrices are rigid, so the inverse rotation is the transpose.
pub fn billboard_rotation_from_view(view: Mat4) -> RotationBlock {
    RotationBlock(Mat3::from_mat4(view).transpose())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f32::consts::{FRAC_PI_4, TAU};

    fn reference_view() -> Mat4 {
        look_at(Vec3::new(0.0, 3.0, 5.0), Vec3::ZERO, Vec3::Y).unwrap()
    }

    #[test]
    fn look_at_matches_glam() {
        let eye = Vec3::new(1.0, 2.0, 7.0);
        let target = Vec3::new(-0.5, 0.2, 0.0);
        let ours = look_at(eye, target, Vec3::Y).unwrap();
        let theirs = Mat4::look_at_rh(eye, target, Vec3::Y);
        assert!(ours.abs_diff_eq(theirs, 1e-5));
    }

    #[test]
    fn look_at_rejects_parallel_up() {
        let err = look_at(Vec3::new(0.0, 5.0, 0.0), Vec3::ZERO, Vec3::Y).unwrap_err();
        assert_eq!(err, TransformError::DegenerateBasis);
    }

    #[test]
    fn look_at_rejects_coincident_eye_and_target() {
        assert_eq!(
            look_at(Vec3::ONE, Vec3::ONE, Vec3::Y),
            Err(TransformError::DegenerateBasis)
        );
    }

    #[test]
    fn perspective_rejects_bad_range() {
        assert_eq!(
            perspective(FRAC_PI_4, 1.0, 10.0, 1.0),
            Err(TransformError::InvalidProjectionRange { near: 10.0, far: 1.0 })
        );
        assert!(matches!(
            perspective(FRAC_PI_4, 1.0, 0.0, 1.0),
            Err(TransformError::InvalidProjectionRange { .. })
        ));
        assert!(matches!(
            perspective(FRAC_PI_4, 1.0, 1.0, 1.0),
            Err(TransformError::InvalidProjectionRange { .. })
        ));
    }

    #[test]
    fn perspective_rejects_bad_fov_and_aspect() {
        assert_eq!(
            perspective(PI, 1.0, 0.1, 100.0),
            Err(TransformError::InvalidFieldOfView(PI))
        );
        assert_eq!(
            perspective(FRAC_PI_4, 0.0, 0.1, 100.0),
            Err(TransformError::InvalidAspectRatio(0.0))
        );
    }

    #[test]
    fn orbit_zero_is_exact() {
        let view = reference_view();
        assert_eq!(orbit(view, Vec3::ZERO, 0.0), view);
        assert_eq!(orbit(view, Vec3::new(1.0, 0.0, -2.0), 0.0), view);
    }

    #[test]
    fn orbit_full_turn_is_periodic() {
        let view = reference_view();
        let full = orbit(view, Vec3::ZERO, TAU);
        assert!(full.abs_diff_eq(orbit(view, Vec3::ZERO, 0.0), 1e-4));
    }

    #[test]
    fn orbit_half_turn_moves_eye_to_far_side() {
        let view = reference_view();
        let eye = eye_position(orbit(view, Vec3::ZERO, PI));
        assert!(eye.abs_diff_eq(Vec3::new(0.0, 3.0, -5.0), 1e-4));
    }

    #[test]
    fn orbit_keeps_target_on_view_axis() {
        let target = Vec3::new(2.0, 0.0, -1.0);
        let view = look_at(Vec3::new(2.0, 1.0, 4.0), target, Vec3::Y).unwrap();
        let turned = orbit(view, target, 1.2);
        let in_view = turned.transform_point3(target);
        assert!(in_view.x.abs() < 1e-4 && in_view.y.abs() < 1e-4);
        assert!(in_view.z < 0.0);
    }

    #[test]
    fn billboard_rotation_is_inverse_view_rotation() {
        let view = orbit(reference_view(), Vec3::ZERO, 0.7);
        let rot = billboard_rotation_from_view(view);
        let expected = Mat3::from_mat4(view.inverse());
        assert!(rot.0.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn billboard_faces_camera() {
        let view = orbit(reference_view(), Vec3::ZERO, 2.0);
        let mut model = Mat4::from_translation(Vec3::new(1.5, 0.0, 0.0));
        billboard_rotation_from_view(view).apply_to(&mut model);
        // The quad's +Z normal, seen from the camera, points straight back at it.
        let normal_in_view = (view * model).transform_vector3(Vec3::Z);
        assert!(normal_in_view.abs_diff_eq(Vec3::Z, 1e-5));
    }

    #[test]
    fn rotation_block_round_trip_identity() {
        let mut model = Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0));
        RotationBlock(Mat3::from_rotation_x(0.3)).apply_to(&mut model);
        RotationBlock::IDENTITY.apply_to(&mut model);
        assert_eq!(model, Mat4::from_translation(Vec3::new(4.0, 5.0, 6.0)));
    }

    #[test]
    fn end_to_end_origin_lands_in_clip_cube() {
        let view = orbit(reference_view(), Vec3::ZERO, 0.0);
        let proj = perspective(FRAC_PI_4, 1.0, 0.1, 100.0).unwrap();
        let ndc = project_point(model_view_projection(Mat4::IDENTITY, view, proj), Vec3::ZERO);
        assert!(ndc.abs().cmple(Vec3::ONE).all(), "ndc out of range: {ndc}");
    }

    fn arb_vec3(range: f32) -> impl Strategy<Value = Vec3> {
        (-range..range, -range..range, -range..range).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    proptest! {
        #[test]
        fn perspective_is_finite(
            fov in 0.01f32..3.1,
            aspect in 0.1f32..10.0,
            near in 0.001f32..10.0,
            depth in 0.01f32..1000.0,
        ) {
            let proj = perspective(fov, aspect, near, near + depth).unwrap();
            prop_assert!(is_finite(&proj));
        }

        #[test]
        fn look_at_inverse_is_identity(eye in arb_vec3(50.0), target in arb_vec3(50.0)) {
            let view = look_at(eye, target, Vec3::Y);
            prop_assume!(view.is_ok());
            let view = view.unwrap();
            prop_assert!((view * view.inverse()).abs_diff_eq(Mat4::IDENTITY, 1e-3));
        }

        #[test]
        fn billboard_patch_preserves_translation(
            translation in arb_vec3(100.0),
            spin in -3.0f32..3.0,
            angle in -6.0f32..6.0,
        ) {
            let mut model = Mat4::from_rotation_translation(glam::Quat::from_rotation_z(spin), translation);
            let before = model;
            let view = orbit(reference_view(), Vec3::ZERO, angle);
            let rot = billboard_rotation_from_view(view);
            rot.apply_to(&mut model);
            prop_assert_eq!(model.w_axis, before.w_axis);
            prop_assert_eq!(model.row(3), before.row(3));
            prop_assert_eq!(RotationBlock::of(&model), rot);
            prop_assert_eq!(model.w_axis, Vec4::new(translation.x, translation.y, translation.z, 1.0));
        }
    }
}
