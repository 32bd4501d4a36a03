use serde_json::json;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use deckport::application::repos::{DecksRepo, ExportJobsRepo, NewExportJob, RepoError};
use deckport::domain::exports::{ExportFormat, ExportStatus, ExportTransition};
use deckport::infra::db::PostgresRepositories;

async fn insert_deck(pool: &PgPool, workspace_id: Uuid, document: serde_json::Value) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO decks (id, workspace_id, theme_id, brand_primary_color, document) \
         VALUES ($1, $2, 'paper', '#112233', $3)",
    )
    .bind(id)
    .bind(workspace_id)
    .bind(document)
    .execute(pool)
    .await
    .unwrap();
    id
}

fn new_job(workspace_id: Uuid) -> NewExportJob {
    NewExportJob {
        deck_id: Uuid::new_v4(),
        workspace_id,
        format: ExportFormat::Pptx,
    }
}

#[sqlx::test(migrations = "./migrations")]
async fn decks_are_scoped_by_workspace(pool: PgPool) {
    let repos = PostgresRepositories::new(pool.clone());
    let workspace = Uuid::new_v4();
    let id = insert_deck(
        &pool,
        workspace,
        json!({ "meta": { "title": "Plan" }, "slides": [] }),
    )
    .await;

    let deck = repos
        .find_deck_for_workspace(id, workspace)
        .await
        .unwrap()
        .expect("deck visible to its workspace");
    assert_eq!(deck.theme_id(), Some("paper"));
    assert_eq!(deck.brand.primary_color.as_deref(), Some("#112233"));
    assert_eq!(deck.document.meta.title, "Plan");

    assert!(
        repos
            .find_deck_for_workspace(id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn malformed_deck_document_is_an_integrity_error(pool: PgPool) {
    let repos = PostgresRepositories::new(pool.clone());
    let id = insert_deck(&pool, Uuid::new_v4(), json!({ "slides": "nope" })).await;

    let err = repos.find_deck(id).await.unwrap_err();
    assert!(matches!(err, RepoError::Integrity { .. }));
}

#[sqlx::test(migrations = "./migrations")]
async fn job_walks_the_state_machine(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let workspace = Uuid::new_v4();
    let job = repos.create_export_job(new_job(workspace)).await.unwrap();
    assert_eq!(job.status, ExportStatus::Queued);

    repos
        .transition_export_job(job.id, ExportTransition::Start)
        .await
        .unwrap();
    let done = repos
        .transition_export_job(job.id, ExportTransition::complete("https://x/exports/1"))
        .await
        .unwrap();
    assert_eq!(done.status, ExportStatus::Completed);
    assert_eq!(done.result_url.as_deref(), Some("https://x/exports/1"));

    let err = repos
        .transition_export_job(job.id, ExportTransition::Start)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::InvalidTransition {
            from: ExportStatus::Completed,
            to: ExportStatus::Processing
        }
    ));

    let stored = repos
        .find_export_job_for_workspace(job.id, workspace)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, done);
    assert!(
        repos
            .find_export_job_for_workspace(job.id, Uuid::new_v4())
            .await
            .unwrap()
            .is_none()
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn unknown_job_transition_is_not_found(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let err = repos
        .transition_export_job(Uuid::new_v4(), ExportTransition::Start)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound));
}

#[sqlx::test(migrations = "./migrations")]
async fn only_queued_jobs_are_discarded(pool: PgPool) {
    let repos = PostgresRepositories::new(pool);
    let queued = repos.create_export_job(new_job(Uuid::new_v4())).await.unwrap();
    let started = repos.create_export_job(new_job(Uuid::new_v4())).await.unwrap();
    repos
        .transition_export_job(started.id, ExportTransition::Start)
        .await
        .unwrap();

    assert!(repos.discard_queued_export_job(queued.id).await.unwrap());
    assert!(!repos.discard_queued_export_job(started.id).await.unwrap());
    assert!(repos.find_export_job(queued.id).await.unwrap().is_none());
    assert!(repos.find_export_job(started.id).await.unwrap().is_some());
}

#[sqlx::test(migrations = "./migrations")]
async fn stale_sweep_fails_old_processing_jobs_only(pool: PgPool) {
    let repos = PostgresRepositories::new(pool.clone());
    let stale = repos.create_export_job(new_job(Uuid::new_v4())).await.unwrap();
    let fresh = repos.create_export_job(new_job(Uuid::new_v4())).await.unwrap();
    let queued = repos.create_export_job(new_job(Uuid::new_v4())).await.unwrap();
    for id in [stale.id, fresh.id] {
        repos
            .transition_export_job(id, ExportTransition::Start)
            .await
            .unwrap();
    }

    let an_hour_ago = OffsetDateTime::now_utc() - Duration::hours(1);
    sqlx::query("UPDATE export_jobs SET updated_at = $2 WHERE id = $1")
        .bind(stale.id)
        .bind(an_hour_ago)
        .execute(&pool)
        .await
        .unwrap();

    let cutoff = OffsetDateTime::now_utc() - Duration::minutes(15);
    let failed = repos
        .fail_stale_processing(cutoff, "export timed out while processing")
        .await
        .unwrap();
    assert_eq!(failed, vec![stale.id]);

    let stale = repos.find_export_job(stale.id).await.unwrap().unwrap();
    assert_eq!(stale.status, ExportStatus::Failed);
    assert_eq!(
        stale.error_message.as_deref(),
        Some("export timed out while processing")
    );
    assert_eq!(
        repos.find_export_job(fresh.id).await.unwrap().unwrap().status,
        ExportStatus::Processing
    );
    assert_eq!(
        repos.find_export_job(queued.id).await.unwrap().unwrap().status,
        ExportStatus::Queued
    );
}
