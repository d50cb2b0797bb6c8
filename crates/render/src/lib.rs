//! Render core: shader programs, geometry buffers, an orbit camera, and the
//! per-frame scheduler, all driven through the [`RenderBackend`] trait.
//!
//! # Invariants
//! - Draw calls carry their program, buffer and uniforms; no ambient binding state.
//! - Each tick runs an update pass, then a read-only draw pass.
//! - Billboarding rewrites a model's rotation block and never its translation.
//!
//! The core never talks to a GPU API directly. [`RecordingBackend`] records
//! commands for tests and headless runs; `quadview-render-wgpu` draws for real.

pub mod backend;
pub mod camera;
pub mod error;
pub mod geometry;
pub mod quad_scene;
pub mod recording;
pub mod renderable;
pub mod scene;
pub mod scheduler;
pub mod shader;
pub mod shaders;
pub mod texture;
pub mod transform;

pub use backend::{
    AttributeBinding, BufferHandle, DrawCall, ProgramHandle, ProgramSource, RenderBackend, TextureHandle, Topology,
    UniformBinding, UniformValue,
};
pub use camera::{CameraConfig, OrbitCamera};
pub use error::{BindingKind, RenderError};
pub use geometry::{GeometryBuffer, LayoutError, VertexAttribute, VertexLayout};
pub use quad_scene::QuadScene;
pub use recording::RecordingBackend;
pub use renderable::{BillboardState, FrameMatrices, Renderable, RenderableId};
pub use scene::{GeometryId, ProgramId, Resources, Scene, TextureId};
pub use scheduler::{FrameReport, FrameScheduler, SceneInputs, SchedulerState, SkippedDraw};
pub use shader::{CompileError, ProgramInterface, ProgramStage, ShaderProgram, UniformKind};
pub use texture::Texture;
pub use transform::{RotationBlock, TransformError};

pub fn crate_info() -> &'static str {
    "quadview-render v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("render"));
    }
}
