//! Queue namespaces shared by producers and workers.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ExportDeck,
}

impl JobType {
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::ExportDeck => "export_deck",
        }
    }
}
