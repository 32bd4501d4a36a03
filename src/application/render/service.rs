use std::sync::Arc;

use bytes::Bytes;
use once_cell::sync::{Lazy, OnceCell};
use thiserror::Error;

use crate::application::render::layout::layout_deck;
use crate::application::render::pdf::write_pdf;
use crate::application::render::pptx::write_pptx;
use crate::application::render::theme::{
    DEFAULT_THEME_ID, ResolvedStyle, find_theme, theme_or_fallback,
};
use crate::application::render::types::{
    RenderError, RenderRequest, RenderService, RenderedArtifact,
};
use crate::domain::exports::ExportFormat;

/// Renders decks into PPTX or PDF. Layout is computed once per request and
/// handed to the writer for the requested format.
pub struct DocumentRenderService {
    fallback_theme: String,
}

impl DocumentRenderService {
    pub fn new(config: RenderPipelineConfig) -> Self {
        Self {
            fallback_theme: config.fallback_theme,
        }
    }
}

impl Default for DocumentRenderService {
    fn default() -> Self {
        Self::new(RenderPipelineConfig::default())
    }
}

impl RenderService for DocumentRenderService {
    fn render(&self, request: &RenderRequest) -> Result<RenderedArtifact, RenderError> {
        let theme = theme_or_fallback(&request.theme_id, &self.fallback_theme);
        let style = ResolvedStyle::resolve(theme, request.brand.as_ref())?;
        let layout = layout_deck(&request.deck, theme, style.logo_url.is_some())?;

        let bytes = match request.format {
            ExportFormat::Pptx => write_pptx(&request.deck, &layout, &style, request.generated_at)?,
            ExportFormat::Pdf => write_pdf(&request.deck, &layout, &style, request.generated_at)?,
        };

        Ok(RenderedArtifact {
            format: request.format,
            bytes: Bytes::from(bytes),
            theme_id: theme.id,
            slide_count: layout.slides.len(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct RenderPipelineConfig {
    /// Theme used when a request names one that does not exist.
    pub fallback_theme: String,
}

impl Default for RenderPipelineConfig {
    fn default() -> Self {
        Self {
            fallback_theme: DEFAULT_THEME_ID.to_string(),
        }
    }
}

impl From<&crate::config::RenderSettings> for RenderPipelineConfig {
    fn from(settings: &crate::config::RenderSettings) -> Self {
        Self {
            fallback_theme: settings.default_theme.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderConfigError {
    #[error("render service already configured")]
    AlreadyConfigured,
    #[error("unknown fallback theme `{0}`")]
    UnknownTheme(String),
}

static RENDER_PIPELINE_CONFIG: OnceCell<RenderPipelineConfig> = OnceCell::new();

pub fn configure_render_service(config: RenderPipelineConfig) -> Result<(), RenderConfigError> {
    if find_theme(&config.fallback_theme).is_none() {
        return Err(RenderConfigError::UnknownTheme(config.fallback_theme));
    }
    RENDER_PIPELINE_CONFIG
        .set(config)
        .map_err(|_| RenderConfigError::AlreadyConfigured)
}

fn active_render_config() -> RenderPipelineConfig {
    RENDER_PIPELINE_CONFIG.get().cloned().unwrap_or_default()
}

static RENDER_SERVICE: Lazy<Arc<DocumentRenderService>> =
    Lazy::new(|| Arc::new(DocumentRenderService::new(active_render_config())));

/// Access the shared render service instance, initialised on first use.
pub fn render_service() -> Arc<DocumentRenderService> {
    Arc::clone(&RENDER_SERVICE)
}
