use serde::{Deserialize, Serialize};

/// Errors from constructing an [`ImagePayload`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image has zero size ({width}x{height})")]
    ZeroSize { width: u32, height: u32 },
    #[error("RGBA buffer for {width}x{height} needs {expected} bytes, got {actual}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// A decoded 2D image: tightly packed RGBA8 rows, top row first.
///
/// Decoding happens in the host. The renderer only ever sees this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

impl ImagePayload {
    pub const BYTES_PER_PIXEL: usize = 4;

    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Result<Self, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::ZeroSize { width, height });
        }
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if rgba.len() != expected {
            return Err(ImageError::SizeMismatch {
                width,
                height,
                expected,
                actual: rgba.len(),
            });
        }
        Ok(Self {
            width,
            height,
            rgba,
        })
    }

    /// A single-colour image, handy as a placeholder texture.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Result<Self, ImageError> {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * Self::BYTES_PER_PIXEL)
            .collect();
        Self::new(width, height, rgba)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * Self::BYTES_PER_PIXEL as u32
    }

    /// RGBA value at `(x, y)`, or `None` outside the image.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL;
        let px = &self.rgba[i..i + Self::BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }
}

/// Colour written to the colour target at the start of each frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClearColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl ClearColor {
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };
}

impl Default for ClearColor {
    fn default() -> Self {
        Self::TRANSPARENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_rejects_wrong_length() {
        let err = ImagePayload::new(2, 2, vec![0; 15]).unwrap_err();
        assert_eq!(
            err,
            ImageError::SizeMismatch {
                width: 2,
                height: 2,
                expected: 16,
                actual: 15
            }
        );
    }

    #[test]
    fn payload_rejects_zero_size() {
        assert!(matches!(
            ImagePayload::new(0, 4, vec![]),
            Err(ImageError::ZeroSize { .. })
        ));
    }

    #[test]
    fn solid_payload_pixels() {
        let img = ImagePayload::solid(3, 2, [10, 20, 30, 255]).unwrap();
        assert_eq!(img.rgba().len(), 24);
        assert_eq!(img.bytes_per_row(), 12);
        assert_eq!(img.pixel(2, 1), Some([10, 20, 30, 255]));
        assert_eq!(img.pixel(3, 0), None);
    }

    #[test]
    fn clear_color_default_is_transparent() {
        assert_eq!(ClearColor::default(), ClearColor::TRANSPARENT);
    }
}
