use crate::backend::RenderBackend;
use crate::camera::{CameraConfig, OrbitCamera};
use crate::error::RenderError;
use crate::geometry::{GeometryBuffer, VertexLayout};
use crate::renderable::{BillboardState, Renderable, RenderableId};
use crate::shader::{CompileError, ShaderProgram};
use crate::texture::Texture;
use quadview_common::{ClearColor, ImagePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// GPU resources created at setup. Renderables refer to them by id.
#[derive(Debug, Default)]
pub struct Resources {
    programs: Vec<ShaderProgram>,
    geometry: Vec<GeometryBuffer>,
    textures: Vec<Texture>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_program<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, CompileError> {
        let program = ShaderProgram::compile(backend, label, vertex_source, fragment_source)?;
        self.programs.push(program);
        Ok(ProgramId(self.programs.len() - 1))
    }

    pub fn add_geometry<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &str,
        vertices: &[f32],
        layout: VertexLayout,
    ) -> Result<GeometryId, RenderError> {
        let buffer = GeometryBuffer::upload(backend, label, vertices, layout)?;
        self.geometry.push(buffer);
        Ok(GeometryId(self.geometry.len() - 1))
    }

    pub fn add_texture<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        label: &str,
        image: &ImagePayload,
    ) -> Result<TextureId, RenderError> {
        let texture = Texture::upload(backend, label, image)?;
        self.textures.push(texture);
        Ok(TextureId(self.textures.len() - 1))
    }

    pub fn program(&self, id: ProgramId) -> Result<&ShaderProgram, RenderError> {
        self.programs
            .get(id.0)
            .ok_or_else(|| RenderError::UnknownResource(format!("program #{}", id.0)))
    }

    pub fn geometry(&self, id: GeometryId) -> Result<&GeometryBuffer, RenderError> {
        self.geometry
            .get(id.0)
            .ok_or_else(|| RenderError::UnknownResource(format!("geometry #{}", id.0)))
    }

    pub fn texture(&self, id: TextureId) -> Result<&Texture, RenderError> {
        self.textures
            .get(id.0)
            .ok_or_else(|| RenderError::UnknownResource(format!("texture #{}", id.0)))
    }

    /// Releases every resource. Safe to call more than once.
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        for program in &mut self.programs {
            program.release(backend);
        }
        for buffer in &mut self.geometry {
            buffer.release(backend);
        }
        for texture in &mut self.textures {
            texture.release(backend);
        }
    }
}

/// Everything one frame draws: resources, the camera, and the flat list of
/// renderables in draw order.
#[derive(Debug)]
pub struct Scene {
    pub resources: Resources,
    pub camera: OrbitCamera,
    pub billboard: BillboardState,
    pub clear_color: ClearColor,
    renderables: Vec<Renderable>,
    viewport: (u32, u32),
}

impl Scene {
    pub fn new(camera: OrbitCamera, viewport: (u32, u32)) -> Self {
        Self {
            resources: Resources::new(),
            camera,
            billboard: BillboardState::default(),
            clear_color: ClearColor::TRANSPARENT,
            renderables: Vec::new(),
            viewport,
        }
    }

    /// Builds the camera from `config` with the aspect ratio of `viewport`.
    pub fn with_camera_config(config: CameraConfig, viewport: (u32, u32)) -> Result<Self, RenderError> {
        let camera = OrbitCamera::new(CameraConfig {
            aspect: viewport.0 as f32 / viewport.1.max(1) as f32,
            ..config
        })?;
        Ok(Self::new(camera, viewport))
    }

    /// Appends a renderable; registration order is draw order.
    pub fn add_renderable(&mut self, renderable: Renderable) -> RenderableId {
        self.renderables.push(renderable);
        RenderableId(self.renderables.len() - 1)
    }

    /// Appends a renderable that faces the camera while billboarding is on.
    pub fn add_billboard(&mut self, renderable: Renderable) -> RenderableId {
        let id = self.add_renderable(renderable);
        self.billboard.add_target(id);
        id
    }

    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    pub fn renderable(&self, id: RenderableId) -> Option<&Renderable> {
        self.renderables.get(id.0)
    }

    pub fn renderable_mut(&mut self, id: RenderableId) -> Option<&mut Renderable> {
        self.renderables.get_mut(id.0)
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Tracks a new viewport size and rebuilds the projection. Zero-sized
    /// viewports (minimised windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            tracing::debug!("ignoring zero-sized viewport {width}x{height}");
            return Ok(());
        }
        if (width, height) == self.viewport {
            return Ok(());
        }
        self.camera.set_viewport(width, height)?;
        self.viewport = (width, height);
        Ok(())
    }

    /// Releases all GPU resources. Safe to call more than once.
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.resources.release(backend);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{QUAD_VERTICES, quad_layout};
    use crate::recording::RecordingBackend;

    fn scene() -> Scene {
        Scene::with_camera_config(CameraConfig::default(), (800, 400)).unwrap()
    }

    #[test]
    fn aspect_follows_viewport() {
        let mut scene = scene();
        assert_eq!(scene.camera.aspect(), 2.0);
        scene.resize(300, 300).unwrap();
        assert_eq!(scene.camera.aspect(), 1.0);
        assert_eq!(scene.viewport(), (300, 300));
    }

    #[test]
    fn zero_viewport_is_ignored() {
        let mut scene = scene();
        scene.resize(0, 0).unwrap();
        assert_eq!(scene.viewport(), (800, 400));
        assert_eq!(scene.camera.aspect(), 2.0);
    }

    #[test]
    fn unknown_ids_are_errors() {
        let resources = Resources::new();
        assert!(matches!(
            resources.program(ProgramId(3)),
            Err(RenderError::UnknownResource(_))
        ));
        assert!(resources.geometry(GeometryId(0)).is_err());
        assert!(resources.texture(TextureId(0)).is_err());
    }

    #[test]
    fn registration_order_is_kept() {
        let mut scene = scene();
        let a = scene.add_renderable(Renderable::new("a", ProgramId(0), GeometryId(0)));
        let b = scene.add_billboard(Renderable::new("b", ProgramId(0), GeometryId(0)));
        assert_eq!((a, b), (RenderableId(0), RenderableId(1)));
        let labels: Vec<_> = scene.renderables().iter().map(|r| r.label()).collect();
        assert_eq!(labels, ["a", "b"]);
        assert_eq!(scene.billboard.targets(), &[b]);
    }

    #[test]
    fn release_frees_everything_once() {
        let mut backend = RecordingBackend::new();
        let mut scene = scene();
        scene
            .resources
            .add_geometry(&mut backend, "quad", &QUAD_VERTICES, quad_layout())
            .unwrap();
        scene
            .resources
            .add_texture(&mut backend, "px", &ImagePayload::solid(1, 1, [0, 0, 0, 255]).unwrap())
            .unwrap();
        scene.release(&mut backend);
        scene.release(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(backend.live_textures(), 0);
    }
}
