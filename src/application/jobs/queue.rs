use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{ExportQueue, JobsRepo, NewJobRecord, RepoError},
    domain::{exports::ExportQueueMessage, types::JobType},
};

/// Enqueue a job with the provided payload, returning the assigned id.
pub async fn enqueue_job<J, P>(
    repo: &J,
    job_type: JobType,
    payload: &P,
    run_at: Option<OffsetDateTime>,
    max_attempts: i32,
    priority: i32,
) -> Result<String, RepoError>
where
    J: JobsRepo + ?Sized,
    P: serde::Serialize,
{
    let payload = serde_json::to_value(payload)
        .map_err(|err| RepoError::from_persistence(err.to_string()))?;
    let record = NewJobRecord {
        job_type,
        payload,
        run_at: run_at.unwrap_or_else(OffsetDateTime::now_utc),
        max_attempts,
        priority,
    };

    repo.enqueue_job(record).await
}

/// Export queue producer backed by the durable job table.
#[derive(Clone)]
pub struct JobsExportQueue {
    jobs: Arc<dyn JobsRepo>,
    max_attempts: i32,
}

impl JobsExportQueue {
    pub fn new(jobs: Arc<dyn JobsRepo>, max_attempts: u32) -> Self {
        Self {
            jobs,
            max_attempts: i32::try_from(max_attempts).unwrap_or(i32::MAX),
        }
    }
}

#[async_trait]
impl ExportQueue for JobsExportQueue {
    async fn add_export_job(&self, message: &ExportQueueMessage) -> Result<String, RepoError> {
        enqueue_job(
            self.jobs.as_ref(),
            JobType::ExportDeck,
            message,
            None,
            self.max_attempts,
            0,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use uuid::Uuid;

    use super::*;
    use crate::domain::exports::ExportFormat;

    #[derive(Default)]
    struct RecordingJobs {
        records: Mutex<Vec<NewJobRecord>>,
    }

    #[async_trait]
    impl JobsRepo for RecordingJobs {
        async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
            let mut records = self.records.lock().unwrap();
            records.push(job);
            Ok(format!("job-{}", records.len()))
        }
    }

    #[tokio::test]
    async fn export_messages_land_in_the_export_namespace() {
        let jobs = Arc::new(RecordingJobs::default());
        let queue = JobsExportQueue::new(jobs.clone(), 5);
        let message = ExportQueueMessage {
            export_job_id: Uuid::new_v4(),
            deck_id: Uuid::new_v4(),
            format: ExportFormat::Pptx,
            theme_id: "default".into(),
            brand_kit: None,
        };

        let id = queue.add_export_job(&message).await.unwrap();
        assert_eq!(id, "job-1");

        let records = jobs.records.lock().unwrap();
        assert_eq!(records[0].job_type, JobType::ExportDeck);
        assert_eq!(records[0].max_attempts, 5);
        assert_eq!(
            records[0].payload["exportJobId"],
            message.export_job_id.to_string()
        );
        assert!(records[0].payload.get("brandKit").is_none());
    }
}
