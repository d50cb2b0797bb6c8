/// Something the user did that changes what the next frame shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Orbit slider position in `[0, 1]`; maps linearly onto the full
    /// orbit range.
    OrbitSlider(f32),
    /// Orbit angle in radians.
    SetOrbitAngle(f32),
    /// Adds to the current orbit angle (keyboard stepping).
    NudgeOrbit(f32),
    ToggleBillboard,
    SetBillboard(bool),
    /// New drawable size in pixels.
    Resize { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_compare_by_value() {
        assert_eq!(InputEvent::OrbitSlider(0.5), InputEvent::OrbitSlider(0.5));
        assert_ne!(InputEvent::SetBillboard(true), InputEvent::ToggleBillboard);
        assert_eq!(
            InputEvent::Resize { width: 2, height: 1 },
            InputEvent::Resize { width: 2, height: 1 }
        );
    }
}
