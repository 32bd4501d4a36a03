use std::{sync::Arc, time::Duration};

use crate::application::exports::ExportService;

/// How often `/exports/{id}/events` re-reads the job.
pub const DEFAULT_STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct ApiState {
    pub exports: Arc<ExportService>,
    pub status_poll_interval: Duration,
}

impl ApiState {
    pub fn new(exports: Arc<ExportService>) -> Self {
        Self {
            exports,
            status_poll_interval: DEFAULT_STATUS_POLL_INTERVAL,
        }
    }

    pub fn with_status_poll_interval(mut self, interval: Duration) -> Self {
        self.status_poll_interval = interval;
        self
    }
}
