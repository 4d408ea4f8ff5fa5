//! Render error types.

use thiserror::Error;

use crate::{styles::StyleError, template::TemplateKind};

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;

/// Errors raised while defining or rendering templates.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A page, layout or component was referenced but never defined.
    #[error("{kind} template not found: {name}")]
    TemplateNotFound { kind: TemplateKind, name: String },

    /// Writing an external stylesheet failed.
    #[error("style error: {0}")]
    Style(#[from] StyleError),

    /// A renderer reported its own failure.
    #[error("render failed: {0}")]
    Failed(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl RenderError {
    /// Create a template-not-found error.
    pub fn not_found(kind: TemplateKind, name: impl Into<String>) -> Self {
        Self::TemplateNotFound {
            kind,
            name: name.into(),
        }
    }

    /// Wrap a failure raised inside a renderer.
    pub fn failed(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_names_template() {
        let err = RenderError::not_found(TemplateKind::Component, "card");
        assert_eq!(err.to_string(), "component template not found: card");
    }

    #[test]
    fn test_failed_from_message() {
        let err = RenderError::failed("boom");
        assert!(err.to_string().contains("boom"));
    }
}
