//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::deck::DeckRecord;
use crate::domain::error::DomainError;
use crate::domain::exports::{
    ExportFormat, ExportJobRecord, ExportQueueMessage, ExportStatus, ExportTransition,
};
use crate::domain::types::JobType;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid transition from `{from}` to `{to}`")]
    InvalidTransition {
        from: ExportStatus,
        to: ExportStatus,
    },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Errors the caller can fix; everything else is infrastructure.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, RepoError::Persistence(_) | RepoError::Timeout)
    }
}

impl From<DomainError> for RepoError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::InvalidTransition { from, to } => RepoError::InvalidTransition { from, to },
        }
    }
}

/// Deck lookup. Decks are owned by another service and read-only here.
#[async_trait]
pub trait DecksRepo: Send + Sync {
    async fn find_deck_for_workspace(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<DeckRecord>, RepoError>;

    /// Unscoped lookup used by the worker, which already holds a job id that
    /// was scoped at submission.
    async fn find_deck(&self, id: Uuid) -> Result<Option<DeckRecord>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewExportJob {
    pub deck_id: Uuid,
    pub workspace_id: Uuid,
    pub format: ExportFormat,
}

#[async_trait]
pub trait ExportJobsRepo: Send + Sync {
    async fn create_export_job(&self, job: NewExportJob) -> Result<ExportJobRecord, RepoError>;

    async fn find_export_job(&self, id: Uuid) -> Result<Option<ExportJobRecord>, RepoError>;

    async fn find_export_job_for_workspace(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<ExportJobRecord>, RepoError>;

    /// Applies a status change atomically. Fails with `NotFound` for unknown
    /// ids and `InvalidTransition` when the edge is not allowed.
    async fn transition_export_job(
        &self,
        id: Uuid,
        transition: ExportTransition,
    ) -> Result<ExportJobRecord, RepoError>;

    /// Removes a job that never left `queued`. Returns whether a row went away.
    async fn discard_queued_export_job(&self, id: Uuid) -> Result<bool, RepoError>;

    /// Moves every job stuck in `processing` since before `cutoff` to
    /// `failed` and returns their ids.
    async fn fail_stale_processing(
        &self,
        cutoff: OffsetDateTime,
        error_message: &str,
    ) -> Result<Vec<Uuid>, RepoError>;
}

#[derive(Debug, Clone)]
pub struct NewJobRecord {
    pub job_type: JobType,
    pub payload: serde_json::Value,
    pub run_at: OffsetDateTime,
    pub max_attempts: i32,
    pub priority: i32,
}

/// Raw access to the durable job queue.
#[async_trait]
pub trait JobsRepo: Send + Sync {
    async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError>;
}

/// Producer side of the export queue. Success means accepted for delivery.
#[async_trait]
pub trait ExportQueue: Send + Sync {
    async fn add_export_job(&self, message: &ExportQueueMessage) -> Result<String, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub key: String,
    pub size_bytes: u64,
    pub checksum: String,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact key `{0}` is not allowed")]
    InvalidKey(String),
    #[error("artifact `{0}` not found")]
    NotFound(String),
    #[error("artifact storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable storage for rendered bytes. `put` overwrites an existing key.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<StoredArtifact, ArtifactError>;

    async fn get(&self, key: &str) -> Result<Bytes, ArtifactError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_transition_error_keeps_states() {
        let err = RepoError::from(DomainError::invalid_transition(
            ExportStatus::Completed,
            ExportStatus::Processing,
        ));
        assert!(matches!(
            err,
            RepoError::InvalidTransition {
                from: ExportStatus::Completed,
                to: ExportStatus::Processing
            }
        ));
        assert!(!err.is_infrastructure());
        assert!(RepoError::Timeout.is_infrastructure());
    }
}
