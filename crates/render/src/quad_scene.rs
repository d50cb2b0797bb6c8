use crate::backend::RenderBackend;
use crate::camera::CameraConfig;
use crate::error::RenderError;
use crate::geometry::{QUAD_VERTICES, quad_layout};
use crate::renderable::{Renderable, RenderableId};
use crate::scene::Scene;
use crate::scheduler::SceneInputs;
use crate::shaders::{QUAD_FRAGMENT_SHADER, QUAD_VERTEX_SHADER};
use glam::{Mat4, Vec3};
use quadview_common::{ImageError, ImagePayload, ViewerConfig};

/// The viewer's scene: one fixed textured quad and one that can billboard,
/// sharing a program, a buffer and a texture.
#[derive(Debug)]
pub struct QuadScene {
    pub scene: Scene,
    pub fixed_quad: RenderableId,
    pub billboard_quad: RenderableId,
}

impl QuadScene {
    pub const FIXED_POSITION: Vec3 = Vec3::new(-1.5, 0.0, 0.0);
    pub const BILLBOARD_POSITION: Vec3 = Vec3::new(1.5, 0.0, 0.0);

    /// Creates all GPU resources. On failure, anything already created is
    /// released before the error is returned.
    pub fn build<B: RenderBackend + ?Sized>(
        backend: &mut B,
        config: &ViewerConfig,
        image: &ImagePayload,
    ) -> Result<Self, RenderError> {
        let camera = CameraConfig::from_settings(&config.camera, config.aspect());
        let mut scene = Scene::with_camera_config(camera, (config.width, config.height))?;
        scene.clear_color = config.clear_color;
        scene.billboard.enabled = config.billboard;

        match Self::populate(&mut scene, backend, image) {
            Ok((fixed_quad, billboard_quad)) => {
                tracing::info!("quad scene ready: {} renderables", scene.renderables().len());
                Ok(Self {
                    scene,
                    fixed_quad,
                    billboard_quad,
                })
            }
            Err(e) => {
                scene.release(backend);
                Err(e)
            }
        }
    }

    fn populate<B: RenderBackend + ?Sized>(
        scene: &mut Scene,
        backend: &mut B,
        image: &ImagePayload,
    ) -> Result<(RenderableId, RenderableId), RenderError> {
        let program = scene
            .resources
            .add_program(backend, "quad", QUAD_VERTEX_SHADER, QUAD_FRAGMENT_SHADER)?;
        let geometry = scene
            .resources
            .add_geometry(backend, "quad", &QUAD_VERTICES, quad_layout())?;
        let texture = scene.resources.add_texture(backend, "quad", image)?;

        let fixed = scene.add_renderable(
            Renderable::new("fixed quad", program, geometry)
                .with_texture(texture)
                .with_model(Mat4::from_translation(Self::FIXED_POSITION)),
        );
        let billboard = scene.add_billboard(
            Renderable::new("billboard quad", program, geometry)
                .with_texture(texture)
                .with_model(Mat4::from_translation(Self::BILLBOARD_POSITION)),
        );
        Ok((fixed, billboard))
    }

    /// Inputs matching the config's starting state.
    pub fn initial_inputs(config: &ViewerConfig) -> SceneInputs {
        SceneInputs {
            orbit_angle: config.orbit_angle,
            billboard: config.billboard,
            viewport: Some((config.width, config.height)),
        }
    }

    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        self.scene.release(backend);
    }
}

/// A yellow smiley on a transparent background, used when the host has no
/// image to load.
pub fn placeholder_image(size: u32) -> Result<ImagePayload, ImageError> {
    let size = size.max(8);
    let mut rgba = Vec::with_capacity(size as usize * size as usize * ImagePayload::BYTES_PER_PIXEL);
    let c = (size as f32 - 1.0) / 2.0;
    let radius = size as f32 * 0.45;
    for y in 0..size {
        for x in 0..size {
            let dx = (x as f32 - c) / radius;
            let dy = (y as f32 - c) / radius;
            let r2 = dx * dx + dy * dy;
            let eye = ((dx.abs() - 0.35).powi(2) + (dy + 0.3).powi(2)) < 0.015;
            let mouth = dy > 0.2 && (r2.sqrt() - 0.6).abs() < 0.07;
            let px = if r2 > 1.0 {
                [0, 0, 0, 0]
            } else if eye || mouth {
                [40, 30, 10, 255]
            } else {
                [250, 210, 40, 255]
            };
            rgba.extend_from_slice(&px);
        }
    }
    ImagePayload::new(size, size, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBackend;

    #[test]
    fn build_creates_shared_resources() {
        let mut backend = RecordingBackend::new();
        let quads = QuadScene::build(&mut backend, &ViewerConfig::default(), &placeholder_image(16).unwrap()).unwrap();
        assert_eq!(backend.live_programs(), 1);
        assert_eq!(backend.live_buffers(), 1);
        assert_eq!(backend.live_textures(), 1);
        assert_eq!(quads.scene.renderables().len(), 2);
        assert_eq!(quads.scene.billboard.targets(), &[quads.billboard_quad]);
    }

    #[test]
    fn failed_build_releases_partial_resources() {
        let mut backend = RecordingBackend::new();
        let config = ViewerConfig::default();
        backend.fail_next_program("no program for you");
        let err = QuadScene::build(&mut backend, &config, &placeholder_image(16).unwrap()).unwrap_err();
        assert!(matches!(err, RenderError::Compile(_)));
        assert_eq!(backend.live_programs() + backend.live_buffers() + backend.live_textures(), 0);
    }

    #[test]
    fn placeholder_has_one_rgba_pixel_per_texel() {
        let img = placeholder_image(3).unwrap();
        assert_eq!((img.width(), img.height()), (8, 8));
        assert_eq!(img.rgba().len(), 8 * 8 * 4);
    }

    #[test]
    fn placeholder_is_transparent_in_the_corners() {
        let img = placeholder_image(32).unwrap();
        assert_eq!(img.pixel(0, 0), Some([0, 0, 0, 0]));
        assert_eq!(img.pixel(16, 16).map(|p| p[3]), Some(255));
    }
}
