use crate::error::RenderError;
use crate::shader::ProgramInterface;
use glam::Mat4;
use quadview_common::{ClearColor, ImagePayload};

/// Backend-owned program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramHandle(pub u64);

/// Backend-owned vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(pub u64);

/// Backend-owned 2D texture together with its sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u64);

/// How the vertices of a draw are assembled into triangles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    /// Triangles `(0, i, i + 1)`; four vertices make a quad.
    TriangleFan,
    TriangleList,
}

impl Topology {
    /// Number of triangles produced from `vertex_count` vertices.
    pub fn triangle_count(self, vertex_count: u32) -> u32 {
        match self {
            Topology::TriangleFan => vertex_count.saturating_sub(2),
            Topology::TriangleList => vertex_count / 3,
        }
    }
}

/// Everything a backend needs to build a program. Sources have already been
/// validated and linked by the core.
#[derive(Debug, Clone, Copy)]
pub struct ProgramSource<'a> {
    pub label: &'a str,
    pub vertex_source: &'a str,
    pub fragment_source: &'a str,
    pub interface: &'a ProgramInterface,
}

/// One vertex attribute fed from the draw's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeBinding {
    pub location: u32,
    pub components: u32,
    pub offset_bytes: u32,
}

/// A value pushed to one uniform slot for one draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Mat4(Mat4),
    Texture(TextureHandle),
    Sampler(TextureHandle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformBinding {
    pub group: u32,
    pub binding: u32,
    pub value: UniformValue,
}

/// A self-contained draw. The program, buffer, attribute layout and every
/// uniform value travel with the call; backends keep no "current" binding.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub label: String,
    pub program: ProgramHandle,
    pub buffer: BufferHandle,
    pub stride_bytes: u32,
    pub attributes: Vec<AttributeBinding>,
    pub uniforms: Vec<UniformBinding>,
    pub topology: Topology,
    pub first_vertex: u32,
    pub vertex_count: u32,
}

impl DrawCall {
    /// The matrix bound at `(group, binding)`, if any.
    pub fn matrix_at(&self, group: u32, binding: u32) -> Option<Mat4> {
        self.uniforms.iter().find_map(|u| match u.value {
            UniformValue::Mat4(m) if u.group == group && u.binding == binding => Some(m),
            _ => None,
        })
    }
}

/// The seam between the render core and a GPU API.
///
/// Calls arrive in a fixed order per frame: `begin_frame`, zero or more
/// `draw`, `end_frame`. Release calls for handles the backend no longer knows
/// are ignored.
pub trait RenderBackend {
    /// Builds a program. On failure the backend has already freed anything it
    /// allocated, and the returned string is the driver diagnostic.
    fn create_program(&mut self, source: &ProgramSource<'_>) -> Result<ProgramHandle, String>;

    fn release_program(&mut self, program: ProgramHandle);

    fn create_vertex_buffer(&mut self, label: &str, vertices: &[f32]) -> Result<BufferHandle, RenderError>;

    fn release_buffer(&mut self, buffer: BufferHandle);

    fn create_texture(&mut self, label: &str, image: &ImagePayload) -> Result<TextureHandle, RenderError>;

    fn release_texture(&mut self, texture: TextureHandle);

    /// Starts a frame: clears colour to `clear` and depth to the far plane.
    fn begin_frame(&mut self, clear: ClearColor) -> Result<(), RenderError>;

    fn draw(&mut self, call: DrawCall) -> Result<(), RenderError>;

    /// Submits the frame's draws. Presenting a window surface, if there is
    /// one, is up to the host.
    fn end_frame(&mut self) -> Result<(), RenderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_triangle_count() {
        assert_eq!(Topology::TriangleFan.triangle_count(4), 2);
        assert_eq!(Topology::TriangleFan.triangle_count(2), 0);
        assert_eq!(Topology::TriangleList.triangle_count(6), 2);
    }

    #[test]
    fn matrix_lookup_by_slot() {
        let call = DrawCall {
            label: "quad".into(),
            program: ProgramHandle(1),
            buffer: BufferHandle(1),
            stride_bytes: 20,
            attributes: vec![],
            uniforms: vec![
                UniformBinding {
                    group: 0,
                    binding: 1,
                    value: UniformValue::Mat4(Mat4::from_scale(glam::Vec3::splat(2.0))),
                },
                UniformBinding {
                    group: 1,
                    binding: 0,
                    value: UniformValue::Texture(TextureHandle(3)),
                },
            ],
            topology: Topology::TriangleFan,
            first_vertex: 0,
            vertex_count: 4,
        };
        assert!(call.matrix_at(0, 1).is_some());
        assert!(call.matrix_at(1, 0).is_none());
        assert!(call.matrix_at(0, 0).is_none());
    }
}
