use thiserror::Error;

use crate::domain::exports::ExportStatus;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid export transition from `{from}` to `{to}`")]
    InvalidTransition {
        from: ExportStatus,
        to: ExportStatus,
    },
}

impl DomainError {
    pub fn invalid_transition(from: ExportStatus, to: ExportStatus) -> Self {
        Self::InvalidTransition { from, to }
    }
}
