//! Wire types shared by the Deckport export API and its clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Target file format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Pdf,
    Pptx,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 2] = [ExportFormat::Pdf, ExportFormat::Pptx];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Pptx => "pptx",
        }
    }

    /// File extension used for stored artifacts.
    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Pptx => {
                "application/vnd.openxmlformats-officedocument.presentationml.presentation"
            }
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownExportFormat(pub String);

impl fmt::Display for UnknownExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown export format `{}`", self.0)
    }
}

impl std::error::Error for UnknownExportFormat {}

/// Parsing is exact: `"PDF"` or `" pdf"` are rejected.
impl FromStr for ExportFormat {
    type Err = UnknownExportFormat;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pdf" => Ok(ExportFormat::Pdf),
            "pptx" => Ok(ExportFormat::Pptx),
            other => Err(UnknownExportFormat(other.to_string())),
        }
    }
}

/// Lifecycle state of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ExportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportStatus::Queued => "queued",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }

    /// The only legal edges are `queued → processing` and
    /// `processing → completed | failed`.
    pub fn can_transition_to(self, next: ExportStatus) -> bool {
        matches!(
            (self, next),
            (ExportStatus::Queued, ExportStatus::Processing)
                | (ExportStatus::Processing, ExportStatus::Completed)
                | (ExportStatus::Processing, ExportStatus::Failed)
        )
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ExportStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "queued" => Ok(ExportStatus::Queued),
            "processing" => Ok(ExportStatus::Processing),
            "completed" => Ok(ExportStatus::Completed),
            "failed" => Ok(ExportStatus::Failed),
            _ => Err(()),
        }
    }
}

/// Body of `POST /decks/{id}/export`.
///
/// `format` stays a raw string so the server can report a field-level
/// validation error instead of a generic deserialisation failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportRequest {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAccepted {
    pub export_job_id: Uuid,
    pub status: ExportStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJobView {
    pub export_job_id: Uuid,
    pub deck_id: Uuid,
    pub format: ExportFormat,
    pub status: ExportStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_exact() {
        assert_eq!("pdf".parse::<ExportFormat>(), Ok(ExportFormat::Pdf));
        assert_eq!("pptx".parse::<ExportFormat>(), Ok(ExportFormat::Pptx));
        assert!("docx".parse::<ExportFormat>().is_err());
        assert!("PDF".parse::<ExportFormat>().is_err());
        assert!("".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn only_forward_transitions_are_allowed() {
        use ExportStatus::*;

        let all = [Queued, Processing, Completed, Failed];
        let allowed = [(Queued, Processing), (Processing, Completed), (Processing, Failed)];

        for from in all {
            for to in all {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_never_leave() {
        for terminal in [ExportStatus::Completed, ExportStatus::Failed] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(ExportStatus::Processing));
            assert!(!terminal.can_transition_to(ExportStatus::Queued));
        }
    }

    #[test]
    fn accepted_body_uses_camel_case() {
        let body = ExportAccepted {
            export_job_id: Uuid::nil(),
            status: ExportStatus::Queued,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["exportJobId"], Uuid::nil().to_string());
    }
}
