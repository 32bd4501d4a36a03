use std::{sync::Arc, time::Duration};

use apalis::prelude::Error as ApalisError;

use crate::application::{
    render::{InFlightRenders, RenderService},
    repos::{ArtifactStore, DecksRepo, ExportJobsRepo},
};

/// Shared context passed to export workers so they can reach infrastructure.
#[derive(Clone)]
pub struct ExportWorkerContext {
    pub decks: Arc<dyn DecksRepo>,
    pub jobs: Arc<dyn ExportJobsRepo>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub renderer: Arc<dyn RenderService>,
    pub inflight_renders: InFlightRenders,
    /// Base for the `resultUrl` written on completion.
    pub public_base_url: String,
    pub render_timeout: Duration,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`].
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}
