use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{ExportJobsRepo, NewExportJob, RepoError},
    domain::exports::{ExportFormat, ExportJobRecord, ExportStatus, ExportTransition},
};

use super::{PostgresRepositories, map_sqlx_error};

const JOB_COLUMNS: &str = "id, deck_id, workspace_id, format, status, result_url, \
    error_message, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ExportJobRow {
    id: Uuid,
    deck_id: Uuid,
    workspace_id: Uuid,
    format: String,
    status: String,
    result_url: Option<String>,
    error_message: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<ExportJobRow> for ExportJobRecord {
    type Error = RepoError;

    fn try_from(row: ExportJobRow) -> Result<Self, Self::Error> {
        let format = row.format.parse::<ExportFormat>().map_err(|_| {
            RepoError::from_persistence(format!("unknown export format `{}`", row.format))
        })?;
        let status = ExportStatus::try_from(row.status.as_str()).map_err(|_| {
            RepoError::from_persistence(format!("unknown export status `{}`", row.status))
        })?;

        Ok(Self {
            id: row.id,
            deck_id: row.deck_id,
            workspace_id: row.workspace_id,
            format,
            status,
            result_url: row.result_url,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl ExportJobsRepo for PostgresRepositories {
    async fn create_export_job(&self, job: NewExportJob) -> Result<ExportJobRecord, RepoError> {
        let record = ExportJobRecord::new_queued(
            job.deck_id,
            job.workspace_id,
            job.format,
            OffsetDateTime::now_utc(),
        );

        let sql = format!(
            "INSERT INTO export_jobs (id, deck_id, workspace_id, format, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(record.id)
            .bind(record.deck_id)
            .bind(record.workspace_id)
            .bind(record.format.as_str())
            .bind(record.status.as_str())
            .bind(record.created_at)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.try_into()
    }

    async fn find_export_job(&self, id: Uuid) -> Result<Option<ExportJobRecord>, RepoError> {
        let sql = format!("SELECT {JOB_COLUMNS} FROM export_jobs WHERE id = $1");
        sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(ExportJobRecord::try_from)
            .transpose()
    }

    async fn find_export_job_for_workspace(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<ExportJobRecord>, RepoError> {
        let sql =
            format!("SELECT {JOB_COLUMNS} FROM export_jobs WHERE id = $1 AND workspace_id = $2");
        sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(id)
            .bind(workspace_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .map(ExportJobRecord::try_from)
            .transpose()
    }

    async fn transition_export_job(
        &self,
        id: Uuid,
        transition: ExportTransition,
    ) -> Result<ExportJobRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!("SELECT {JOB_COLUMNS} FROM export_jobs WHERE id = $1 FOR UPDATE");
        let mut record: ExportJobRecord = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?
            .try_into()?;

        record.apply(&transition, OffsetDateTime::now_utc())?;

        let sql = format!(
            "UPDATE export_jobs \
                SET status = $2, result_url = $3, error_message = $4, updated_at = $5 \
              WHERE id = $1 \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ExportJobRow>(&sql)
            .bind(record.id)
            .bind(record.status.as_str())
            .bind(record.result_url.as_deref())
            .bind(record.error_message.as_deref())
            .bind(record.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        row.try_into()
    }

    async fn discard_queued_export_job(&self, id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM export_jobs WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(ExportStatus::Queued.as_str())
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn fail_stale_processing(
        &self,
        cutoff: OffsetDateTime,
        error_message: &str,
    ) -> Result<Vec<Uuid>, RepoError> {
        sqlx::query_scalar::<_, Uuid>(
            "UPDATE export_jobs \
                SET status = $1, error_message = $2, result_url = NULL, updated_at = now() \
              WHERE status = $3 AND updated_at < $4 \
             RETURNING id",
        )
        .bind(ExportStatus::Failed.as_str())
        .bind(error_message)
        .bind(ExportStatus::Processing.as_str())
        .bind(cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
