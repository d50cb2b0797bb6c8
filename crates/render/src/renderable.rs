use crate::backend::{AttributeBinding, DrawCall, RenderBackend, Topology, UniformBinding, UniformValue};
use crate::error::RenderError;
use crate::geometry::GeometryBuffer;
use crate::scene::{GeometryId, ProgramId, TextureId};
use crate::shader::{ShaderProgram, UniformKind};
use crate::texture::Texture;
use crate::transform::RotationBlock;
use glam::Mat4;

pub const MODEL_UNIFORM: &str = "u_model";
pub const VIEW_UNIFORM: &str = "u_view";
pub const PROJECTION_UNIFORM: &str = "u_proj";
pub const TEXTURE_UNIFORM: &str = "u_tex";
pub const SAMPLER_UNIFORM: &str = "u_sampler";

/// Camera matrices shared by every draw in a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameMatrices {
    pub view: Mat4,
    pub projection: Mat4,
}

/// Index of a renderable in its scene; also its draw order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(pub usize);

/// One drawable object: a program and a buffer (both borrowed by id) plus
/// the object's own uniform values.
#[derive(Debug, Clone)]
pub struct Renderable {
    label: String,
    program: ProgramId,
    geometry: GeometryId,
    texture: Option<TextureId>,
    base_model: Mat4,
    model: Mat4,
}

impl Renderable {
    pub fn new(label: impl Into<String>, program: ProgramId, geometry: GeometryId) -> Self {
        Self {
            label: label.into(),
            program,
            geometry,
            texture: None,
            base_model: Mat4::IDENTITY,
            model: Mat4::IDENTITY,
        }
    }

    pub fn with_texture(mut self, texture: TextureId) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn with_model(mut self, model: Mat4) -> Self {
        self.set_base_model(model);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn program(&self) -> ProgramId {
        self.program
    }

    pub fn geometry(&self) -> GeometryId {
        self.geometry
    }

    pub fn texture(&self) -> Option<TextureId> {
        self.texture
    }

    /// Model matrix used for the next draw.
    pub fn model(&self) -> Mat4 {
        self.model
    }

    /// Model matrix as placed in the scene, before any billboarding.
    pub fn base_model(&self) -> Mat4 {
        self.base_model
    }

    pub fn set_base_model(&mut self, model: Mat4) {
        self.base_model = model;
        self.model = model;
    }

    /// Replaces the rotation block with `rotation`; translation is kept.
    pub fn apply_billboard(&mut self, rotation: &RotationBlock) {
        let mut model = self.base_model;
        rotation.apply_to(&mut model);
        self.model = model;
    }

    /// Restores the placed rotation block.
    pub fn clear_billboard(&mut self) {
        self.model = self.base_model;
    }

    /// Submits one fan draw over the whole buffer. The program and geometry
    /// are passed in explicitly; nothing is assumed to be bound already.
    /// Fails without submitting anything if a binding cannot be resolved or
    /// a uniform the program declares would be left without a value.
    pub fn draw<B: RenderBackend + ?Sized>(
        &self,
        program: &ShaderProgram,
        geometry: &GeometryBuffer,
        texture: Option<&Texture>,
        frame: &FrameMatrices,
        backend: &mut B,
    ) -> Result<(), RenderError> {
        let program_handle = program.handle()?;
        let layout = geometry.layout();
        let attributes = layout
            .attributes()
            .iter()
            .map(|attr| {
                program.attribute_location(&attr.name).map(|info| AttributeBinding {
                    location: info.location,
                    components: attr.components,
                    offset_bytes: attr.offset_bytes,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut uniforms = vec![
            matrix_uniform(program, MODEL_UNIFORM, self.model)?,
            matrix_uniform(program, VIEW_UNIFORM, frame.view)?,
            matrix_uniform(program, PROJECTION_UNIFORM, frame.projection)?,
        ];
        if let Some(texture) = texture {
            let handle = texture.handle()?;
            uniforms.push(resource_uniform(program, TEXTURE_UNIFORM, UniformKind::Texture, UniformValue::Texture(handle))?);
            uniforms.push(resource_uniform(program, SAMPLER_UNIFORM, UniformKind::Sampler, UniformValue::Sampler(handle))?);
        }
        if let Some(missing) = program
            .interface()
            .uniforms
            .iter()
            .find(|u| !uniforms.iter().any(|b| (b.group, b.binding) == (u.group, u.binding)))
        {
            return Err(RenderError::UnboundUniform(missing.name.clone()));
        }

        backend.draw(DrawCall {
            label: self.label.clone(),
            program: program_handle,
            buffer: geometry.handle()?,
            stride_bytes: layout.stride_bytes(),
            attributes,
            uniforms,
            topology: Topology::TriangleFan,
            first_vertex: 0,
            vertex_count: geometry.vertex_count(),
        })
    }
}

fn matrix_uniform(program: &ShaderProgram, name: &str, value: Mat4) -> Result<UniformBinding, RenderError> {
    let info = program.uniform_location(name)?;
    let expected = UniformKind::Buffer {
        size: std::mem::size_of::<Mat4>() as u32,
    };
    if info.kind != expected {
        return Err(RenderError::UniformTypeMismatch {
            name: name.to_string(),
            expected: "mat4x4<f32>",
        });
    }
    Ok(UniformBinding {
        group: info.group,
        binding: info.binding,
        value: UniformValue::Mat4(value),
    })
}

fn resource_uniform(
    program: &ShaderProgram,
    name: &str,
    kind: UniformKind,
    value: UniformValue,
) -> Result<UniformBinding, RenderError> {
    let info = program.uniform_location(name)?;
    if info.kind != kind {
        return Err(RenderError::UniformTypeMismatch {
            name: name.to_string(),
            expected: match kind {
                UniformKind::Texture => "texture_2d<f32>",
                UniformKind::Sampler => "sampler",
                UniformKind::Buffer { .. } => "uniform buffer",
            },
        });
    }
    Ok(UniformBinding {
        group: info.group,
        binding: info.binding,
        value,
    })
}

/// Which renderables face the camera, and whether that is switched on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BillboardState {
    pub enabled: bool,
    targets: Vec<RenderableId>,
}

impl BillboardState {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            targets: Vec::new(),
        }
    }

    pub fn add_target(&mut self, id: RenderableId) {
        if !self.targets.contains(&id) {
            self.targets.push(id);
        }
    }

    pub fn targets(&self) -> &[RenderableId] {
        &self.targets
    }

    pub fn applies_to(&self, id: RenderableId) -> bool {
        self.targets.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{QUAD_VERTICES, quad_layout};
    use crate::recording::RecordingBackend;
    use crate::transform::{billboard_rotation_from_view, look_at};
    use glam::{Mat3, Vec3};
    use quadview_common::{ClearColor, ImagePayload};

    const VS: &str = r#"
@group(0) @binding(0) var<uniform> u_model: mat4x4<f32>;
@group(0) @binding(1) var<uniform> u_view: mat4x4<f32>;
@group(0) @binding(2) var<uniform> u_proj: mat4x4<f32>;
struct VsOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) v_tex: vec2<f32>,
};
@vertex
fn vs_main(@location(0) a_pos: vec3<f32>, @location(1) a_tex: vec2<f32>) -> VsOut {
    var out: VsOut;
    out.clip = u_proj * u_view * u_model * vec4<f32>(a_pos, 1.0);
    out.v_tex = a_tex;
    return out;
}
"#;

    const FS: &str = r#"
@group(1) @binding(0) var u_tex: texture_2d<f32>;
@group(1) @binding(1) var u_sampler: sampler;
@fragment
fn fs_main(@location(0) v_tex: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(u_tex, u_sampler, 1.0 - v_tex);
}
"#;

    const FS_FLAT: &str = r#"
@fragment
fn fs_main(@location(0) v_tex: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(v_tex, 0.0, 1.0);
}
"#;

    struct Fixture {
        backend: RecordingBackend,
        program: ShaderProgram,
        geometry: GeometryBuffer,
        texture: Texture,
    }

    fn fixture(fs: &str) -> Fixture {
        let mut backend = RecordingBackend::new();
        let program = ShaderProgram::compile(&mut backend, "quad", VS, fs).unwrap();
        let geometry = GeometryBuffer::upload(&mut backend, "quad", &QUAD_VERTICES, quad_layout()).unwrap();
        let image = ImagePayload::solid(2, 2, [255, 255, 255, 255]).unwrap();
        let texture = Texture::upload(&mut backend, "white", &image).unwrap();
        backend.begin_frame(ClearColor::TRANSPARENT).unwrap();
        Fixture {
            backend,
            program,
            geometry,
            texture,
        }
    }

    fn frame() -> FrameMatrices {
        FrameMatrices {
            view: look_at(Vec3::new(0.0, 3.0, 5.0), Vec3::ZERO, Vec3::Y).unwrap(),
            projection: Mat4::IDENTITY,
        }
    }

    #[test]
    fn draw_submits_one_self_contained_fan() {
        let mut f = fixture(FS);
        let model = Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0));
        let quad = Renderable::new("quad", ProgramId(0), GeometryId(0))
            .with_texture(TextureId(0))
            .with_model(model);
        quad.draw(&f.program, &f.geometry, Some(&f.texture), &frame(), &mut f.backend)
            .unwrap();

        let draws = f.backend.last_frame_draws();
        assert_eq!(draws.len(), 1);
        let call = draws[0];
        assert_eq!(call.topology, Topology::TriangleFan);
        assert_eq!((call.first_vertex, call.vertex_count), (0, 4));
        assert_eq!(call.stride_bytes, 20);
        assert_eq!(call.program, f.program.handle().unwrap());
        assert_eq!(call.buffer, f.geometry.handle().unwrap());
        assert_eq!(
            call.attributes,
            vec![
                AttributeBinding { location: 0, components: 3, offset_bytes: 0 },
                AttributeBinding { location: 1, components: 2, offset_bytes: 12 },
            ]
        );
        assert_eq!(call.matrix_at(0, 0), Some(model));
        assert_eq!(call.matrix_at(0, 1), Some(frame().view));
        assert_eq!(call.matrix_at(0, 2), Some(Mat4::IDENTITY));
        assert_eq!(call.uniforms.len(), 5);
    }

    #[test]
    fn texture_without_sampler_slot_is_unknown_binding() {
        let mut f = fixture(FS_FLAT);
        let quad = Renderable::new("quad", ProgramId(0), GeometryId(0)).with_texture(TextureId(0));
        let err = quad
            .draw(&f.program, &f.geometry, Some(&f.texture), &frame(), &mut f.backend)
            .unwrap_err();
        assert_eq!(err, RenderError::unknown_uniform(TEXTURE_UNIFORM));
        assert!(f.backend.last_frame_draws().is_empty());
    }

    #[test]
    fn untextured_draw_on_flat_program() {
        let mut f = fixture(FS_FLAT);
        let quad = Renderable::new("quad", ProgramId(0), GeometryId(0));
        quad.draw(&f.program, &f.geometry, None, &frame(), &mut f.backend)
            .unwrap();
        assert_eq!(f.backend.last_frame_draws()[0].uniforms.len(), 3);
    }

    #[test]
    fn untextured_draw_on_textured_program_is_rejected() {
        let mut f = fixture(FS);
        let quad = Renderable::new("quad", ProgramId(0), GeometryId(0));
        let err = quad
            .draw(&f.program, &f.geometry, None, &frame(), &mut f.backend)
            .unwrap_err();
        assert_eq!(err, RenderError::UnboundUniform(TEXTURE_UNIFORM.into()));
        assert!(f.backend.last_frame_draws().is_empty());
    }

    #[test]
    fn released_program_cannot_draw() {
        let mut f = fixture(FS);
        f.program.release(&mut f.backend);
        let quad = Renderable::new("quad", ProgramId(0), GeometryId(0));
        let err = quad
            .draw(&f.program, &f.geometry, None, &frame(), &mut f.backend)
            .unwrap_err();
        assert_eq!(err, RenderError::Released("shader program"));
    }

    #[test]
    fn billboard_toggle_restores_identity_rotation() {
        let placed = Mat4::from_translation(Vec3::new(-1.5, 0.5, 0.0));
        let mut quad = Renderable::new("quad", ProgramId(0), GeometryId(0)).with_model(placed);
        quad.apply_billboard(&billboard_rotation_from_view(frame().view));
        assert_ne!(quad.model(), placed);
        assert_eq!(quad.model().w_axis, placed.w_axis);
        quad.clear_billboard();
        assert_eq!(quad.model(), placed);
        assert_eq!(Mat3::from_mat4(quad.model()), Mat3::IDENTITY);
    }

    #[test]
    fn billboard_targets_are_unique() {
        let mut state = BillboardState::new(true);
        state.add_target(RenderableId(1));
        state.add_target(RenderableId(1));
        assert_eq!(state.targets(), &[RenderableId(1)]);
        assert!(state.applies_to(RenderableId(1)));
        assert!(!state.applies_to(RenderableId(0)));
    }
}
