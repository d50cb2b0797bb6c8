use crate::geometry::LayoutError;
use crate::shader::CompileError;
use crate::transform::TransformError;
use quadview_common::ImageError;
use std::fmt;

/// Which half of a program's interface a name was looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Attribute,
    Uniform,
}

impl fmt::Display for BindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingKind::Attribute => f.write_str("attribute"),
            BindingKind::Uniform => f.write_str("uniform"),
        }
    }
}

/// Errors from the render core and its backends.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("unknown {kind} binding `{name}`")]
    UnknownBinding { kind: BindingKind, name: String },
    #[error("program uniform `{0}` was given no value")]
    UnboundUniform(String),
    #[error("uniform `{name}` is not a {expected}")]
    UniformTypeMismatch { name: String, expected: &'static str },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Image(#[from] ImageError),
    #[error("unknown resource: {0}")]
    UnknownResource(String),
    #[error("{0} used after release")]
    Released(&'static str),
    #[error("backend error: {0}")]
    Backend(String),
}

impl RenderError {
    pub fn unknown_attribute(name: impl Into<String>) -> Self {
        Self::UnknownBinding {
            kind: BindingKind::Attribute,
            name: name.into(),
        }
    }

    pub fn unknown_uniform(name: impl Into<String>) -> Self {
        Self::UnknownBinding {
            kind: BindingKind::Uniform,
            name: name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_binding_display() {
        assert_eq!(
            RenderError::unknown_uniform("u_tex").to_string(),
            "unknown uniform binding `u_tex`"
        );
        assert_eq!(
            RenderError::UnboundUniform("u_tex".into()).to_string(),
            "program uniform `u_tex` was given no value"
        );
        assert_eq!(
            RenderError::unknown_attribute("a_pos").to_string(),
            "unknown attribute binding `a_pos`"
        );
    }

    #[test]
    fn transform_error_converts() {
        let err: RenderError = TransformError::DegenerateBasis.into();
        assert!(matches!(err, RenderError::Transform(TransformError::DegenerateBasis)));
    }
}
