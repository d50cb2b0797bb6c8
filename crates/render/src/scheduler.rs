//! Per-frame sequencing: one update pass, then one read-only draw pass.
//!
//! # Invariants
//! - Camera orbit angle and model matrices are written only by the update pass.
//! - Draw order is registration order.
//! - One failing renderable never stops the rest of the frame.

use crate::backend::RenderBackend;
use crate::error::RenderError;
use crate::renderable::{FrameMatrices, Renderable};
use crate::scene::Scene;
use crate::transform::billboard_rotation_from_view;
use std::fmt;

/// Host-driven inputs, read once at the start of every tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SceneInputs {
    /// Orbit angle in radians.
    pub orbit_angle: f32,
    pub billboard: bool,
    /// Latest viewport size in pixels, if the host reported one.
    pub viewport: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No frame drawn yet.
    Idle,
    /// Steady per-frame loop.
    Running,
}

/// A renderable that was left out of a frame, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDraw {
    pub label: String,
    pub error: RenderError,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrameReport {
    pub frame: u64,
    pub submitted: usize,
    pub skipped: Vec<SkippedDraw>,
}

impl FrameReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

type FrameCallback = Box<dyn FnMut(&FrameReport)>;

/// Drives the clear / update / draw / present sequence.
pub struct FrameScheduler {
    state: SchedulerState,
    frames: u64,
    callbacks: Vec<FrameCallback>,
}

impl fmt::Debug for FrameScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameScheduler")
            .field("state", &self.state)
            .field("frames", &self.frames)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameScheduler {
    pub fn new() -> Self {
        Self {
            state: SchedulerState::Idle,
            frames: 0,
            callbacks: Vec::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Frames completed so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Registers a callback run after every completed tick. A tick that
    /// fails with a frame-level error runs no callbacks, so hosts must not
    /// rely on them alone to schedule the next frame.
    pub fn on_frame(&mut self, callback: impl FnMut(&FrameReport) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Runs one frame. Errors are frame-level failures from the backend
    /// (e.g. a lost surface); per-renderable failures land in the report.
    pub fn tick<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: &mut Scene,
        inputs: &SceneInputs,
    ) -> Result<FrameReport, RenderError> {
        if self.state == SchedulerState::Idle {
            tracing::info!("frame scheduler running");
            self.state = SchedulerState::Running;
        }

        let frame = Self::update(scene, inputs);

        backend.begin_frame(scene.clear_color)?;
        let mut report = FrameReport {
            frame: self.frames + 1,
            ..FrameReport::default()
        };
        for renderable in scene.renderables() {
            match Self::draw_one(scene, renderable, &frame, backend) {
                Ok(()) => report.submitted += 1,
                Err(error) => {
                    tracing::warn!("skipping `{}` this frame: {error}", renderable.label());
                    report.skipped.push(SkippedDraw {
                        label: renderable.label().to_string(),
                        error,
                    });
                }
            }
        }
        backend.end_frame()?;
        self.frames += 1;

        for callback in &mut self.callbacks {
            callback(&report);
        }
        Ok(report)
    }

    /// Applies inputs to the camera and billboard targets; returns the
    /// matrices the draw pass reads.
    fn update(scene: &mut Scene, inputs: &SceneInputs) -> FrameMatrices {
        if let Some((width, height)) = inputs.viewport {
            if let Err(e) = scene.resize(width, height) {
                tracing::warn!("viewport {width}x{height} rejected: {e}");
            }
        }
        scene.camera.set_orbit_angle(inputs.orbit_angle);
        if scene.billboard.enabled != inputs.billboard {
            tracing::debug!("billboarding {}", if inputs.billboard { "on" } else { "off" });
        }
        scene.billboard.enabled = inputs.billboard;

        let view = scene.camera.compute_view();
        let rotation = billboard_rotation_from_view(view);
        let targets = scene.billboard.targets().to_vec();
        for id in targets {
            let enabled = scene.billboard.enabled;
            if let Some(renderable) = scene.renderable_mut(id) {
                if enabled {
                    renderable.apply_billboard(&rotation);
                } else {
                    renderable.clear_billboard();
                }
            }
        }

        FrameMatrices {
            view,
            projection: scene.camera.compute_projection(),
        }
    }

    fn draw_one<B: RenderBackend + ?Sized>(
        scene: &Scene,
        renderable: &Renderable,
        frame: &FrameMatrices,
        backend: &mut B,
    ) -> Result<(), RenderError> {
        let resources = &scene.resources;
        let program = resources.program(renderable.program())?;
        let geometry = resources.geometry(renderable.geometry())?;
        let texture = renderable
            .texture()
            .map(|id| resources.texture(id))
            .transpose()?;
        renderable.draw(program, geometry, texture, frame, backend)
    }
}
