use crate::transform::{self, TransformError};
use glam::{Mat4, Vec3};
use quadview_common::CameraSettings;

/// Construction parameters for an [`OrbitCamera`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraConfig {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_radians: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraConfig {
    pub fn from_settings(settings: &CameraSettings, aspect: f32) -> Self {
        Self {
            eye: settings.eye,
            target: settings.target,
            up: settings.up,
            fov_radians: settings.fov_degrees.to_radians(),
            aspect,
            near: settings.near,
            far: settings.far,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self::from_settings(&CameraSettings::default(), 1.0)
    }
}

/// Camera that orbits a fixed target around the vertical axis.
///
/// The view is always re-derived from the initial view and the current
/// orbit angle. The projection is cached and only rebuilt when a lens
/// parameter changes.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov_radians: f32,
    aspect: f32,
    near: f32,
    far: f32,
    orbit_angle: f32,
    initial_view: Mat4,
    projection: Mat4,
}

impl OrbitCamera {
    pub fn new(config: CameraConfig) -> Result<Self, TransformError> {
        let initial_view = transform::look_at(config.eye, config.target, config.up)?;
        let projection = transform::perspective(config.fov_radians, config.aspect, config.near, config.far)?;
        Ok(Self {
            position: config.eye,
            target: config.target,
            up: config.up,
            fov_radians: config.fov_radians,
            aspect: config.aspect,
            near: config.near,
            far: config.far,
            orbit_angle: 0.0,
            initial_view,
            projection,
        })
    }

    /// Current view: the initial view orbited by `orbit_angle`.
    pub fn compute_view(&self) -> Mat4 {
        transform::orbit(self.initial_view, self.target, self.orbit_angle)
    }

    /// Cached perspective projection.
    pub fn compute_projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view_projection(&self) -> Mat4 {
        self.compute_projection() * self.compute_view()
    }

    pub fn orbit_angle(&self) -> f32 {
        self.orbit_angle
    }

    pub fn set_orbit_angle(&mut self, radians: f32) {
        self.orbit_angle = radians;
    }

    /// Initial eye position, before any orbit.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Eye position after applying the current orbit.
    pub fn eye(&self) -> Vec3 {
        transform::eye_position(self.compute_view())
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn fov_radians(&self) -> f32 {
        self.fov_radians
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn clip_planes(&self) -> (f32, f32) {
        (self.near, self.far)
    }

    pub fn set_aspect(&mut self, aspect: f32) -> Result<(), TransformError> {
        self.rebuild_projection(self.fov_radians, aspect, self.near, self.far)
    }

    /// Recomputes the aspect ratio from a viewport size in pixels.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> Result<(), TransformError> {
        self.set_aspect(width as f32 / height as f32)
    }

    pub fn set_fov(&mut self, fov_radians: f32) -> Result<(), TransformError> {
        self.rebuild_projection(fov_radians, self.aspect, self.near, self.far)
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) -> Result<(), TransformError> {
        self.rebuild_projection(self.fov_radians, self.aspect, near, far)
    }

    fn rebuild_projection(&mut self, fov_radians: f32, aspect: f32, near: f32, far: f32) -> Result<(), TransformError> {
        if (fov_radians, aspect, near, far) == (self.fov_radians, self.aspect, self.near, self.far) {
            return Ok(());
        }
        self.projection = transform::perspective(fov_radians, aspect, near, far)?;
        self.fov_radians = fov_radians;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
        tracing::debug!("projection rebuilt: fov={fov_radians:.3} aspect={aspect:.3} near={near} far={far}");
        Ok(())
    }
}
