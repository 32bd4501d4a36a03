//! Export submission, status lookup, and artifact download.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use deckport_api_types::{ExportAccepted, ExportJobView};

use crate::application::metrics::METRIC_EXPORTS_SUBMITTED;
use crate::application::repos::{
    ArtifactError, ArtifactStore, DecksRepo, ExportJobsRepo, ExportQueue, NewExportJob, RepoError,
};
use crate::domain::exports::{
    BrandKit, ExportFormat, ExportJobRecord, ExportQueueMessage, ExportStatus, artifact_key,
};

const SOURCE: &str = "application::exports::ExportService";

/// Detail reported for any missing or unsupported `format`.
pub const FORMAT_HINT: &str = "must be one of: pdf, pptx";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("deck not found")]
    DeckNotFound,
    #[error("export job not found")]
    JobNotFound,
    #[error("export job is still {status}")]
    NotReady { status: ExportStatus },
    #[error("failed to enqueue export job: {0}")]
    Queue(#[source] RepoError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl ExportError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Validates the requested format. Matching is exact.
pub fn parse_format(format: Option<&str>) -> Result<ExportFormat, ExportError> {
    format
        .and_then(|value| value.parse::<ExportFormat>().ok())
        .ok_or_else(|| ExportError::validation("format", FORMAT_HINT))
}

/// Bytes of a finished export plus what a client needs to save them.
#[derive(Debug, Clone)]
pub struct ExportDownload {
    pub bytes: Bytes,
    pub content_type: &'static str,
    pub filename: String,
}

#[derive(Clone)]
pub struct ExportService {
    decks: Arc<dyn DecksRepo>,
    jobs: Arc<dyn ExportJobsRepo>,
    queue: Arc<dyn ExportQueue>,
    artifacts: Arc<dyn ArtifactStore>,
    default_theme: String,
}

impl ExportService {
    pub fn new(
        decks: Arc<dyn DecksRepo>,
        jobs: Arc<dyn ExportJobsRepo>,
        queue: Arc<dyn ExportQueue>,
        artifacts: Arc<dyn ArtifactStore>,
        default_theme: impl Into<String>,
    ) -> Self {
        Self {
            decks,
            jobs,
            queue,
            artifacts,
            default_theme: default_theme.into(),
        }
    }

    /// Creates a queued job for the deck and hands it to the queue.
    ///
    /// The format is checked before the deck is looked up. If the queue
    /// rejects the message, the queued record is removed again so no job is
    /// left that nothing will ever process.
    pub async fn submit_export(
        &self,
        deck_id: Uuid,
        workspace_id: Uuid,
        format: Option<&str>,
    ) -> Result<ExportAccepted, ExportError> {
        let format = parse_format(format)?;

        let deck = self
            .decks
            .find_deck_for_workspace(deck_id, workspace_id)
            .await?
            .ok_or(ExportError::DeckNotFound)?;

        let job = self
            .jobs
            .create_export_job(NewExportJob {
                deck_id,
                workspace_id,
                format,
            })
            .await?;

        let message = ExportQueueMessage {
            export_job_id: job.id,
            deck_id,
            format,
            theme_id: deck
                .theme_id()
                .map(str::to_string)
                .unwrap_or_else(|| self.default_theme.clone()),
            brand_kit: BrandKit::from_fields(&deck.brand),
        };

        if let Err(err) = self.queue.add_export_job(&message).await {
            error!(
                target = SOURCE,
                export_job_id = %job.id,
                deck_id = %deck_id,
                error = %err,
                "enqueue failed; discarding queued job"
            );
            if let Err(discard) = self.jobs.discard_queued_export_job(job.id).await {
                warn!(
                    target = SOURCE,
                    export_job_id = %job.id,
                    error = %discard,
                    "failed to discard queued job after enqueue failure"
                );
            }
            return Err(ExportError::Queue(err));
        }

        counter!(METRIC_EXPORTS_SUBMITTED, "format" => format.as_str()).increment(1);
        info!(
            target = SOURCE,
            export_job_id = %job.id,
            deck_id = %deck_id,
            workspace_id = %workspace_id,
            format = %format,
            theme_id = %message.theme_id,
            "export queued"
        );

        Ok(ExportAccepted {
            export_job_id: job.id,
            status: job.status,
        })
    }

    pub async fn load_job(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<ExportJobView, ExportError> {
        self.find_job(id, workspace_id).await.map(job_view)
    }

    /// Artifact bytes of a completed job. Jobs still moving yield `NotReady`;
    /// failed jobs have nothing to download.
    pub async fn load_artifact(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<ExportDownload, ExportError> {
        let job = self.find_job(id, workspace_id).await?;
        match job.status {
            ExportStatus::Completed => {}
            ExportStatus::Failed => return Err(ExportError::JobNotFound),
            status => return Err(ExportError::NotReady { status }),
        }

        let bytes = match self.artifacts.get(&artifact_key(job.id, job.format)).await {
            Ok(bytes) => bytes,
            Err(ArtifactError::NotFound(_)) => return Err(ExportError::JobNotFound),
            Err(err) => return Err(err.into()),
        };

        Ok(ExportDownload {
            bytes,
            content_type: job.format.content_type(),
            filename: format!("deck-{}.{}", job.deck_id, job.format.extension()),
        })
    }

    async fn find_job(&self, id: Uuid, workspace_id: Uuid) -> Result<ExportJobRecord, ExportError> {
        self.jobs
            .find_export_job_for_workspace(id, workspace_id)
            .await?
            .ok_or(ExportError::JobNotFound)
    }
}

pub fn job_view(job: ExportJobRecord) -> ExportJobView {
    ExportJobView {
        export_job_id: job.id,
        deck_id: job.deck_id,
        format: job.format,
        status: job.status,
        created_at: job.created_at,
        updated_at: job.updated_at,
        result_url: job.result_url,
        error_message: job.error_message,
    }
}
