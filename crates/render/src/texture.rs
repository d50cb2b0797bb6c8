use crate::backend::{RenderBackend, TextureHandle};
use crate::error::RenderError;
use quadview_common::ImagePayload;

/// A sampled 2D texture uploaded from a decoded image.
#[derive(Debug)]
pub struct Texture {
    label: String,
    handle: Option<TextureHandle>,
    width: u32,
    height: u32,
}

impl Texture {
    pub fn upload<B: RenderBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        image: &ImagePayload,
    ) -> Result<Self, RenderError> {
        let handle = backend.create_texture(label, image)?;
        tracing::debug!("texture `{label}` uploaded: {}x{}", image.width(), image.height());
        Ok(Self {
            label: label.to_string(),
            handle: Some(handle),
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> Result<TextureHandle, RenderError> {
        self.handle.ok_or(RenderError::Released("texture"))
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(handle) = self.handle.take() {
            backend.release_texture(handle);
            tracing::debug!("texture `{}` released", self.label);
        }
    }
}
