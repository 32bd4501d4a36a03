//! Export job records, the status state machine, and the queue payload.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use deckport_api_types::{ExportFormat, ExportStatus};

use crate::domain::deck::BrandFields;
use crate::domain::error::DomainError;

/// Durable source of truth for one export request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportJobRecord {
    pub id: Uuid,
    pub deck_id: Uuid,
    pub workspace_id: Uuid,
    pub format: ExportFormat,
    pub status: ExportStatus,
    pub result_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl ExportJobRecord {
    pub fn new_queued(
        deck_id: Uuid,
        workspace_id: Uuid,
        format: ExportFormat,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            deck_id,
            workspace_id,
            format,
            status: ExportStatus::Queued,
            result_url: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies `transition` in place. The record is left untouched when the
    /// edge is not allowed from the current status.
    pub fn apply(
        &mut self,
        transition: &ExportTransition,
        now: OffsetDateTime,
    ) -> Result<(), DomainError> {
        let next = transition.validate(self.status)?;
        self.status = next;
        match transition {
            ExportTransition::Start => {}
            ExportTransition::Complete { result_url } => {
                self.result_url = Some(result_url.clone());
                self.error_message = None;
            }
            ExportTransition::Fail { error_message } => {
                self.error_message = Some(error_message.clone());
                self.result_url = None;
            }
        }
        self.updated_at = now;
        Ok(())
    }
}

/// Storage key of a job's artifact. Fixed per job so re-renders overwrite.
pub fn artifact_key(job_id: Uuid, format: ExportFormat) -> String {
    format!("exports/{job_id}.{}", format.extension())
}

/// Public download location recorded as `resultUrl`.
pub fn download_url(public_base_url: &str, job_id: Uuid) -> String {
    format!(
        "{}/exports/{job_id}/download",
        public_base_url.trim_end_matches('/')
    )
}

/// A requested status change together with the data it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTransition {
    Start,
    Complete { result_url: String },
    Fail { error_message: String },
}

impl ExportTransition {
    pub fn complete(result_url: impl Into<String>) -> Self {
        Self::Complete {
            result_url: result_url.into(),
        }
    }

    pub fn fail(error_message: impl Into<String>) -> Self {
        Self::Fail {
            error_message: error_message.into(),
        }
    }

    pub fn target(&self) -> ExportStatus {
        match self {
            ExportTransition::Start => ExportStatus::Processing,
            ExportTransition::Complete { .. } => ExportStatus::Completed,
            ExportTransition::Fail { .. } => ExportStatus::Failed,
        }
    }

    /// Returns the status reached from `current`, or `InvalidTransition`.
    pub fn validate(&self, current: ExportStatus) -> Result<ExportStatus, DomainError> {
        let next = self.target();
        if current.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::invalid_transition(current, next))
        }
    }
}

/// Brand overrides carried in the queue message. Only present fields are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandKit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
}

impl BrandKit {
    /// `None` when the deck sets no brand field at all. Blank strings count
    /// as unset.
    pub fn from_fields(fields: &BrandFields) -> Option<Self> {
        let pick = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let kit = Self {
            primary_color: pick(&fields.primary_color),
            secondary_color: pick(&fields.secondary_color),
            logo_url: pick(&fields.logo_url),
        };

        (!kit.is_empty()).then_some(kit)
    }

    pub fn is_empty(&self) -> bool {
        self.primary_color.is_none() && self.secondary_color.is_none() && self.logo_url.is_none()
    }
}

/// Lightweight dispatch instruction handed to the export worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportQueueMessage {
    pub export_job_id: Uuid,
    pub deck_id: Uuid,
    pub format: ExportFormat,
    pub theme_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand_kit: Option<BrandKit>,
}
