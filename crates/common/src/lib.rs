//! Shared types for the quadview workspace.
//!
//! Nothing in here touches the GPU. Hosts decode images and read config
//! files; the render core consumes the resulting values.

pub mod config;
pub mod types;

pub use config::{CameraSettings, ConfigError, ViewerConfig};
pub use types::{ClearColor, ImageError, ImagePayload};
