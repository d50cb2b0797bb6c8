use crate::backend::{BufferHandle, RenderBackend};
use crate::error::RenderError;

const FLOAT_BYTES: u32 = std::mem::size_of::<f32>() as u32;

/// One attribute inside an interleaved f32 vertex record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: String,
    pub components: u32,
    pub stride_bytes: u32,
    pub offset_bytes: u32,
}

impl VertexAttribute {
    pub fn new(name: impl Into<String>, components: u32, stride_bytes: u32, offset_bytes: u32) -> Self {
        Self {
            name: name.into(),
            components,
            stride_bytes,
            offset_bytes,
        }
    }

    pub fn size_bytes(&self) -> u32 {
        self.components * FLOAT_BYTES
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("vertex layout has no attributes")]
    Empty,
    #[error("attribute `{name}` has {components} components (need 1..=4)")]
    ComponentCount { name: String, components: u32 },
    #[error("attribute `{name}` has stride {stride}, expected {expected}")]
    StrideMismatch { name: String, stride: u32, expected: u32 },
    #[error("attribute `{name}` ends at byte {end}, past the {stride}-byte record")]
    OutOfRecord { name: String, end: u32, stride: u32 },
    #[error("attribute `{name}` is not 4-byte aligned")]
    Misaligned { name: String },
    #[error("{floats} floats is not a whole number of {stride}-byte records")]
    PartialRecord { floats: usize, stride: u32 },
}

/// Ordered attribute layout of an interleaved vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexLayout {
    attributes: Vec<VertexAttribute>,
}

impl VertexLayout {
    pub fn new(attributes: Vec<VertexAttribute>) -> Self {
        Self { attributes }
    }

    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Record size shared by every attribute (taken from the first one).
    pub fn stride_bytes(&self) -> u32 {
        self.attributes.first().map_or(0, |a| a.stride_bytes)
    }

    /// Checks that the layout describes `float_count` floats of whole records.
    pub fn validate(&self, float_count: usize) -> Result<(), LayoutError> {
        let stride = self.stride_bytes();
        if self.attributes.is_empty() || stride == 0 {
            return Err(LayoutError::Empty);
        }
        for attr in &self.attributes {
            if !(1..=4).contains(&attr.components) {
                return Err(LayoutError::ComponentCount {
                    name: attr.name.clone(),
                    components: attr.components,
                });
            }
            if attr.stride_bytes != stride {
                return Err(LayoutError::StrideMismatch {
                    name: attr.name.clone(),
                    stride: attr.stride_bytes,
                    expected: stride,
                });
            }
            if attr.offset_bytes % FLOAT_BYTES != 0 {
                return Err(LayoutError::Misaligned {
                    name: attr.name.clone(),
                });
            }
            let end = attr.offset_bytes + attr.size_bytes();
            if end > stride {
                return Err(LayoutError::OutOfRecord {
                    name: attr.name.clone(),
                    end,
                    stride,
                });
            }
        }
        if stride % FLOAT_BYTES != 0 || float_count % (stride / FLOAT_BYTES) as usize != 0 {
            return Err(LayoutError::PartialRecord {
                floats: float_count,
                stride,
            });
        }
        Ok(())
    }

    /// Number of whole vertex records in `float_count` floats.
    pub fn vertex_count(&self, float_count: usize) -> u32 {
        let floats_per_vertex = (self.stride_bytes() / FLOAT_BYTES) as usize;
        if floats_per_vertex == 0 {
            return 0;
        }
        (float_count / floats_per_vertex) as u32
    }
}

/// An immutable vertex buffer on the backend plus its layout.
#[derive(Debug)]
pub struct GeometryBuffer {
    label: String,
    handle: Option<BufferHandle>,
    layout: VertexLayout,
    vertex_count: u32,
}

impl GeometryBuffer {
    /// Uploads `vertices` once. A layout that does not fit the data is a
    /// programming error and trips a debug assertion.
    pub fn upload<B: RenderBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        vertices: &[f32],
        layout: VertexLayout,
    ) -> Result<Self, RenderError> {
        debug_assert!(
            layout.validate(vertices.len()).is_ok(),
            "vertex layout for `{label}` does not fit its data: {:?}",
            layout.validate(vertices.len())
        );
        let handle = backend.create_vertex_buffer(label, vertices)?;
        let vertex_count = layout.vertex_count(vertices.len());
        tracing::debug!("geometry `{label}` uploaded: {vertex_count} vertices");
        Ok(Self {
            label: label.to_string(),
            handle: Some(handle),
            layout,
            vertex_count,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn handle(&self) -> Result<BufferHandle, RenderError> {
        self.handle.ok_or(RenderError::Released("geometry buffer"))
    }

    pub fn layout(&self) -> &VertexLayout {
        &self.layout
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_none()
    }

    /// Frees the backend buffer. Safe to call more than once.
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(handle) = self.handle.take() {
            backend.release_buffer(handle);
            tracing::debug!("geometry `{}` released", self.label);
        }
    }
}

/// Interleaved `[x, y, z, u, v]` quad in fan order: bottom-right,
/// bottom-left, top-left, top-right.
#[rustfmt::skip]
pub const QUAD_VERTICES: [f32; 20] = [
     1.0, -1.0, 0.0,  1.0, 0.0,
    -1.0, -1.0, 0.0,  0.0, 0.0,
    -1.0,  1.0, 0.0,  0.0, 1.0,
     1.0,  1.0, 0.0,  1.0, 1.0,
];

/// Layout matching [`QUAD_VERTICES`].
pub fn quad_layout() -> VertexLayout {
    let stride = 5 * FLOAT_BYTES;
    VertexLayout::new(vec![
        VertexAttribute::new("a_pos", 3, stride, 0),
        VertexAttribute::new("a_tex", 2, stride, 3 * FLOAT_BYTES),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingBackend;

    #[test]
    fn quad_layout_is_consistent() {
        let layout = quad_layout();
        assert_eq!(layout.validate(QUAD_VERTICES.len()), Ok(()));
        assert_eq!(layout.stride_bytes(), 20);
        assert_eq!(layout.vertex_count(QUAD_VERTICES.len()), 4);
    }

    #[test]
    fn attribute_past_record_is_rejected() {
        let layout = VertexLayout::new(vec![
            VertexAttribute::new("a_pos", 3, 16, 0),
            VertexAttribute::new("a_tex", 2, 16, 12),
        ]);
        assert_eq!(
            layout.validate(8),
            Err(LayoutError::OutOfRecord {
                name: "a_tex".into(),
                end: 20,
                stride: 16
            })
        );
    }

    #[test]
    fn partial_record_is_rejected() {
        assert!(matches!(
            quad_layout().validate(QUAD_VERTICES.len() - 1),
            Err(LayoutError::PartialRecord { .. })
        ));
    }

    #[test]
    fn mixed_strides_are_rejected() {
        let layout = VertexLayout::new(vec![
            VertexAttribute::new("a_pos", 3, 20, 0),
            VertexAttribute::new("a_tex", 2, 24, 12),
        ]);
        assert!(matches!(layout.validate(10), Err(LayoutError::StrideMismatch { .. })));
    }

    #[test]
    fn bad_component_count_and_empty_layout() {
        let layout = VertexLayout::new(vec![VertexAttribute::new("a_pos", 5, 20, 0)]);
        assert!(matches!(layout.validate(5), Err(LayoutError::ComponentCount { .. })));
        assert_eq!(VertexLayout::new(vec![]).validate(0), Err(LayoutError::Empty));
    }

    #[test]
    fn upload_and_release() {
        let mut backend = RecordingBackend::new();
        let mut quad = GeometryBuffer::upload(&mut backend, "quad", &QUAD_VERTICES, quad_layout()).unwrap();
        assert_eq!(quad.vertex_count(), 4);
        assert_eq!(backend.live_buffers(), 1);
        quad.release(&mut backend);
        quad.release(&mut backend);
        assert_eq!(backend.live_buffers(), 0);
        assert_eq!(quad.handle(), Err(RenderError::Released("geometry buffer")));
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    #[cfg(debug_assertions)]
    fn inconsistent_upload_panics_in_debug() {
        let mut backend = RecordingBackend::new();
        let _ = GeometryBuffer::upload(&mut backend, "broken", &[0.0; 7], quad_layout());
    }
}
