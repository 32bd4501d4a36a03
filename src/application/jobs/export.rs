use std::time::Instant;

use apalis::prelude::{Data, Error as ApalisError};
use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        jobs::{ExportWorkerContext, job_failed},
        metrics::{METRIC_EXPORT_RENDER_MS, METRIC_EXPORTS_COMPLETED, METRIC_EXPORTS_FAILED},
        render::{InFlightError, RenderError, RenderRequest, RenderedArtifact},
        repos::{ArtifactError, RepoError},
    },
    domain::deck::DeckRecord,
    domain::exports::{
        ExportJobRecord, ExportQueueMessage, ExportStatus, ExportTransition, artifact_key,
        download_url,
    },
};

const TARGET: &str = "application::jobs::process_export_job";

/// Why a render did not produce an artifact. Recorded on the job; the queue
/// message is still acknowledged.
#[derive(Debug, Error)]
pub enum ExportFailure {
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("render timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("renderer stopped unexpectedly")]
    Crashed,
    #[error("deck no longer exists")]
    DeckMissing,
    #[error("deck document is malformed: {detail}")]
    DeckUnreadable { detail: String },
}

impl ExportFailure {
    /// Message stored on the job and shown to clients.
    pub fn public_message(&self) -> String {
        match self {
            ExportFailure::Render(RenderError::Document { .. } | RenderError::Archive { .. }) => {
                "document generation failed".to_string()
            }
            ExportFailure::DeckUnreadable { .. } => "deck document is malformed".to_string(),
            other => other.to_string(),
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            ExportFailure::Render(err) => err.reason(),
            ExportFailure::Timeout { .. } => "timeout",
            ExportFailure::Crashed => "crashed",
            ExportFailure::DeckMissing => "deck_missing",
            ExportFailure::DeckUnreadable { .. } => "deck_unreadable",
        }
    }
}

/// Infrastructure problems. These go back to the queue so it retries; the
/// job record is left where it is.
#[derive(Debug, Error)]
pub enum ExportWorkerError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Completed { result_url: String },
    Failed { error_message: String },
    /// Terminal job delivered again; nothing to do.
    AlreadyFinished,
    /// Another slot in this process is handling the same job.
    Duplicate,
    /// No job record for the message.
    Missing,
}

/// Apalis entry point for the `export_deck` namespace.
pub async fn process_export_job(
    message: ExportQueueMessage,
    context: Data<ExportWorkerContext>,
) -> Result<(), ApalisError> {
    handle_export_message(&context, &message)
        .await
        .map(|_| ())
        .map_err(|err| {
            error!(
                target = TARGET,
                export_job_id = %message.export_job_id,
                error = %err,
                "export attempt failed; leaving job for retry"
            );
            job_failed(err)
        })
}

/// Idempotent handling of one delivery: queued jobs start, processing jobs
/// (redelivered after a crash) are rendered again, terminal jobs are skipped.
pub async fn handle_export_message(
    ctx: &ExportWorkerContext,
    message: &ExportQueueMessage,
) -> Result<ExportOutcome, ExportWorkerError> {
    let job_id = message.export_job_id;
    let _guard = match ctx.inflight_renders.acquire(job_id) {
        Ok(guard) => guard,
        Err(InFlightError::AlreadyRunning { job_id }) => {
            warn!(
                target = TARGET,
                export_job_id = %job_id,
                "export already in flight; dropping duplicate delivery"
            );
            return Ok(ExportOutcome::Duplicate);
        }
    };

    let Some(job) = ctx.jobs.find_export_job(job_id).await? else {
        warn!(
            target = TARGET,
            export_job_id = %job_id,
            "export job record missing; acknowledging message"
        );
        return Ok(ExportOutcome::Missing);
    };

    match job.status {
        ExportStatus::Completed | ExportStatus::Failed => {
            info!(
                target = TARGET,
                export_job_id = %job_id,
                status = %job.status,
                "export already finished; acknowledging duplicate"
            );
            return Ok(ExportOutcome::AlreadyFinished);
        }
        ExportStatus::Queued => {
            if !start_job(ctx, job_id).await? {
                return Ok(ExportOutcome::AlreadyFinished);
            }
        }
        ExportStatus::Processing => {
            info!(
                target = TARGET,
                export_job_id = %job_id,
                "export redelivered while processing; rendering again"
            );
        }
    }

    // Read-at-render: the deck is fetched now, not captured at enqueue.
    let rendered = match ctx.decks.find_deck(job.deck_id).await {
        Ok(Some(deck)) => render_deck(ctx, message, &job, deck).await,
        Ok(None) => Err(ExportFailure::DeckMissing),
        Err(RepoError::Integrity { message }) => {
            Err(ExportFailure::DeckUnreadable { detail: message })
        }
        Err(err) => return Err(err.into()),
    };

    match rendered {
        Ok(artifact) => complete_job(ctx, &job, artifact).await,
        Err(failure) => fail_job(ctx, &job, failure).await,
    }
}

/// Returns `false` when the job turned terminal underneath us.
async fn start_job(ctx: &ExportWorkerContext, job_id: Uuid) -> Result<bool, ExportWorkerError> {
    match ctx
        .jobs
        .transition_export_job(job_id, ExportTransition::Start)
        .await
    {
        Ok(_) => Ok(true),
        Err(RepoError::InvalidTransition { from, .. }) if from.is_terminal() => Ok(false),
        Err(RepoError::InvalidTransition { .. }) => Ok(true),
        Err(err) => Err(err.into()),
    }
}

/// Returns `false` when another delivery or the stale sweep finished the job
/// first; that outcome stands.
async fn finish_job(
    ctx: &ExportWorkerContext,
    job_id: Uuid,
    transition: ExportTransition,
) -> Result<bool, ExportWorkerError> {
    match ctx.jobs.transition_export_job(job_id, transition).await {
        Ok(_) => Ok(true),
        Err(RepoError::InvalidTransition { from, to }) if from.is_terminal() => {
            warn!(
                target = TARGET,
                export_job_id = %job_id,
                status = %from,
                wanted = %to,
                "export finished elsewhere; keeping recorded outcome"
            );
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

async fn render_deck(
    ctx: &ExportWorkerContext,
    message: &ExportQueueMessage,
    job: &ExportJobRecord,
    deck: DeckRecord,
) -> Result<RenderedArtifact, ExportFailure> {
    let request = RenderRequest::new(deck.document, job.format, message.theme_id.clone())
        .with_brand(message.brand_kit.clone())
        .with_generated_at(OffsetDateTime::now_utc());

    let renderer = ctx.renderer.clone();
    let started_at = Instant::now();
    let handle = tokio::task::spawn_blocking(move || renderer.render(&request));
    let result = tokio::time::timeout(ctx.render_timeout, handle).await;
    histogram!(METRIC_EXPORT_RENDER_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

    let artifact = match result {
        Err(_) => {
            return Err(ExportFailure::Timeout {
                seconds: ctx.render_timeout.as_secs(),
            });
        }
        Ok(Err(join_error)) => {
            error!(
                target = TARGET,
                export_job_id = %job.id,
                error = %join_error,
                "render task panicked"
            );
            return Err(ExportFailure::Crashed);
        }
        Ok(Ok(rendered)) => rendered?,
    };

    if artifact.theme_id != message.theme_id {
        warn!(
            target = TARGET,
            export_job_id = %job.id,
            requested = %message.theme_id,
            applied = artifact.theme_id,
            "unknown theme; rendered with fallback"
        );
    }

    Ok(artifact)
}

async fn complete_job(
    ctx: &ExportWorkerContext,
    job: &ExportJobRecord,
    artifact: RenderedArtifact,
) -> Result<ExportOutcome, ExportWorkerError> {
    let key = artifact_key(job.id, job.format);
    let stored = ctx.artifacts.put(&key, artifact.bytes).await?;

    let result_url = download_url(&ctx.public_base_url, job.id);
    if !finish_job(ctx, job.id, ExportTransition::complete(result_url.clone())).await? {
        return Ok(ExportOutcome::AlreadyFinished);
    }

    counter!(METRIC_EXPORTS_COMPLETED, "format" => job.format.as_str()).increment(1);
    info!(
        target = TARGET,
        export_job_id = %job.id,
        deck_id = %job.deck_id,
        format = %job.format,
        slides = artifact.slide_count,
        size_bytes = stored.size_bytes,
        checksum = %stored.checksum,
        "export completed"
    );

    Ok(ExportOutcome::Completed { result_url })
}

async fn fail_job(
    ctx: &ExportWorkerContext,
    job: &ExportJobRecord,
    failure: ExportFailure,
) -> Result<ExportOutcome, ExportWorkerError> {
    let error_message = failure.public_message();
    if !finish_job(ctx, job.id, ExportTransition::fail(error_message.clone())).await? {
        return Ok(ExportOutcome::AlreadyFinished);
    }

    counter!(METRIC_EXPORTS_FAILED, "reason" => failure.reason()).increment(1);
    warn!(
        target = TARGET,
        export_job_id = %job.id,
        deck_id = %job.deck_id,
        format = %job.format,
        error = %failure,
        "export failed"
    );

    Ok(ExportOutcome::Failed { error_message })
}
