use crate::event::InputEvent;
use quadview_render::SceneInputs;
use std::f32::consts::TAU;

/// Largest orbit angle, in either direction: two full turns end to end.
pub const ORBIT_LIMIT: f32 = TAU;

/// Accumulates input events between ticks.
#[derive(Debug, Clone, Default)]
pub struct InputBridge {
    inputs: SceneInputs,
}

impl InputBridge {
    pub fn new(initial: SceneInputs) -> Self {
        Self {
            inputs: SceneInputs {
                orbit_angle: clamp_angle(initial.orbit_angle),
                ..initial
            },
        }
    }

    /// Folds one event into the pending inputs. Returns whether anything
    /// changed, so hosts can skip redraws for no-op events.
    pub fn apply(&mut self, event: InputEvent) -> bool {
        let before = self.inputs;
        match event {
            InputEvent::OrbitSlider(t) => self.inputs.orbit_angle = slider_to_angle(t),
            InputEvent::SetOrbitAngle(angle) => self.inputs.orbit_angle = clamp_angle(angle),
            InputEvent::NudgeOrbit(delta) => {
                self.inputs.orbit_angle = clamp_angle(self.inputs.orbit_angle + delta)
            }
            InputEvent::ToggleBillboard => self.inputs.billboard = !self.inputs.billboard,
            InputEvent::SetBillboard(on) => self.inputs.billboard = on,
            InputEvent::Resize { width, height } => self.inputs.viewport = Some((width, height)),
        }
        let changed = self.inputs != before;
        if changed {
            tracing::trace!("input {event:?} -> {:?}", self.inputs);
        }
        changed
    }

    /// Inputs for the next tick.
    pub fn inputs(&self) -> &SceneInputs {
        &self.inputs
    }

    /// Slider position matching the current orbit angle.
    pub fn slider_position(&self) -> f32 {
        angle_to_slider(self.inputs.orbit_angle)
    }
}

/// Maps `[0, 1]` onto `[-ORBIT_LIMIT, ORBIT_LIMIT]`; out-of-range and NaN
/// positions are clamped (NaN to the centre).
pub fn slider_to_angle(t: f32) -> f32 {
    let t = if t.is_nan() { 0.5 } else { t.clamp(0.0, 1.0) };
    -ORBIT_LIMIT + t * 2.0 * ORBIT_LIMIT
}

pub fn angle_to_slider(angle: f32) -> f32 {
    (clamp_angle(angle) + ORBIT_LIMIT) / (2.0 * ORBIT_LIMIT)
}

fn clamp_angle(angle: f32) -> f32 {
    if angle.is_nan() {
        0.0
    } else {
        angle.clamp(-ORBIT_LIMIT, ORBIT_LIMIT)
    }
}
