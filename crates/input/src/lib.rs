//! Host input: UI widgets and keys become [`InputEvent`]s, and the
//! [`InputBridge`] folds them into the `SceneInputs` read by each tick.
//!
//! # Invariants
//! - The orbit angle always stays within `[-2π, 2π]`.
//! - Hosts never touch the camera directly; only `SceneInputs` crosses over.

pub mod bridge;
pub mod event;

pub use bridge::{InputBridge, ORBIT_LIMIT};
pub use event::InputEvent;
