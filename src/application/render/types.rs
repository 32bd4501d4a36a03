use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::deck::Deck;
use crate::domain::exports::{BrandKit, ExportFormat};

/// Rendering request passed into the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub deck: Deck,
    pub format: ExportFormat,
    /// Requested theme. Unknown ids fall back to the configured default.
    pub theme_id: String,
    pub brand: Option<BrandKit>,
    /// Only ever written into document metadata, never into slide bodies.
    pub generated_at: Option<OffsetDateTime>,
}

impl RenderRequest {
    pub fn new(deck: Deck, format: ExportFormat, theme_id: impl Into<String>) -> Self {
        Self {
            deck,
            format,
            theme_id: theme_id.into(),
            brand: None,
            generated_at: None,
        }
    }

    pub fn with_brand(mut self, brand: Option<BrandKit>) -> Self {
        self.brand = brand;
        self
    }

    pub fn with_generated_at(mut self, generated_at: OffsetDateTime) -> Self {
        self.generated_at = Some(generated_at);
        self
    }
}

/// Finished document bytes plus what was actually used to produce them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub format: ExportFormat,
    pub bytes: Bytes,
    /// Theme applied, which differs from the requested id after a fallback.
    pub theme_id: &'static str,
    pub slide_count: usize,
}

impl RenderedArtifact {
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }
}

/// Structured errors surfaced by the rendering pipeline. These should map cleanly
/// to job failure reasons without leaking implementation details.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("unknown block kind `{kind}` (slide {slide}, block {block})")]
    UnknownBlockKind {
        kind: String,
        slide: usize,
        block: usize,
    },
    #[error("invalid {field} colour `{value}`: expected RRGGBB or RGB hex")]
    InvalidColor { field: &'static str, value: String },
    #[error("slide {slide} contains `{character}`, which PDF export cannot encode")]
    UnsupportedText { character: char, slide: usize },
    #[error("document processing failed: {message}")]
    Document { message: String },
    #[error("archive packaging failed: {message}")]
    Archive { message: String },
}

impl RenderError {
    pub fn document(message: impl Into<String>) -> Self {
        Self::Document {
            message: message.into(),
        }
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Short machine-friendly reason used in metrics labels.
    pub fn reason(&self) -> &'static str {
        match self {
            RenderError::UnknownBlockKind { .. } => "unknown_block_kind",
            RenderError::InvalidColor { .. } => "invalid_color",
            RenderError::UnsupportedText { .. } => "unsupported_text",
            RenderError::Document { .. } => "document",
            RenderError::Archive { .. } => "archive",
        }
    }
}

/// Trait exposed by the rendering pipeline. Implementations must be pure and
/// deterministic: given the same input, they return identical outputs or errors.
pub trait RenderService: Send + Sync {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderError>;
}
