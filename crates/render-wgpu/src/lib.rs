//! wgpu backend for the quadview render core.
//!
//! Programs become shader modules plus bind group layouts; render pipelines
//! are built on first use for each vertex layout. Triangle fans are drawn as
//! indexed triangle lists since wgpu has no fan topology.
//!
//! # Invariants
//! - The backend never reads scene state; everything arrives in draw calls.
//! - Matrix uniforms are staged per draw, never shared between draws.
//! - The host owns the surface: it sets the target view and presents.

mod gpu;

pub use gpu::{DEPTH_FORMAT, WgpuBackend, fan_indices};
