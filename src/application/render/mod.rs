//! Deck rendering pipeline.
//!
//! The pipeline is pure: it accepts a deck plus theme and brand overrides and
//! produces document bytes deterministically. Recording job outcomes happens in
//! the caller, typically the export worker.

mod layout;
mod pdf;
mod pptx;
mod runtime;
mod service;
mod theme;
mod types;

pub use layout::{DeckLayout, Element, Rect, SLIDE_HEIGHT, SLIDE_WIDTH, layout_deck, stat_grid};
pub use runtime::{InFlightError, InFlightRenders, RenderGuard};
pub use service::{
    DocumentRenderService, RenderConfigError, RenderPipelineConfig, configure_render_service,
    render_service,
};
pub use theme::{DEFAULT_THEME_ID, Rgb, Theme, find_theme, theme_ids};
pub use types::{RenderError, RenderRequest, RenderService, RenderedArtifact};
