#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

use deckport::application::exports::ExportService;
use deckport::application::repos::{
    ArtifactError, ArtifactStore, DecksRepo, ExportJobsRepo, ExportQueue, NewExportJob, RepoError,
    StoredArtifact,
};
use deckport::domain::deck::{BrandFields, Deck, DeckRecord};
use deckport::domain::exports::{
    ExportJobRecord, ExportQueueMessage, ExportStatus, ExportTransition,
};

pub const PUBLIC_BASE_URL: &str = "https://exports.test";

#[derive(Default)]
pub struct MemoryDecks {
    decks: Mutex<HashMap<Uuid, DeckRecord>>,
}

impl MemoryDecks {
    pub async fn insert(&self, deck: DeckRecord) {
        self.decks.lock().await.insert(deck.id, deck);
    }
}

#[async_trait]
impl DecksRepo for MemoryDecks {
    async fn find_deck_for_workspace(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<DeckRecord>, RepoError> {
        Ok(self
            .decks
            .lock()
            .await
            .get(&id)
            .filter(|deck| deck.workspace_id == workspace_id)
            .cloned())
    }

    async fn find_deck(&self, id: Uuid) -> Result<Option<DeckRecord>, RepoError> {
        Ok(self.decks.lock().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MemoryExportJobs {
    jobs: Mutex<HashMap<Uuid, ExportJobRecord>>,
}

impl MemoryExportJobs {
    pub async fn get(&self, id: Uuid) -> Option<ExportJobRecord> {
        self.jobs.lock().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<ExportJobRecord> {
        self.jobs.lock().await.values().cloned().collect()
    }

    /// Walks a job through the given transitions, bypassing the worker.
    pub async fn advance(&self, id: Uuid, transitions: &[ExportTransition]) {
        for transition in transitions {
            self.transition_export_job(id, transition.clone())
                .await
                .unwrap();
        }
    }
}

#[async_trait]
impl ExportJobsRepo for MemoryExportJobs {
    async fn create_export_job(&self, job: NewExportJob) -> Result<ExportJobRecord, RepoError> {
        let record = ExportJobRecord::new_queued(
            job.deck_id,
            job.workspace_id,
            job.format,
            OffsetDateTime::now_utc(),
        );
        self.jobs.lock().await.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_export_job(&self, id: Uuid) -> Result<Option<ExportJobRecord>, RepoError> {
        Ok(self.get(id).await)
    }

    async fn find_export_job_for_workspace(
        &self,
        id: Uuid,
        workspace_id: Uuid,
    ) -> Result<Option<ExportJobRecord>, RepoError> {
        Ok(self
            .get(id)
            .await
            .filter(|job| job.workspace_id == workspace_id))
    }

    async fn transition_export_job(
        &self,
        id: Uuid,
        transition: ExportTransition,
    ) -> Result<ExportJobRecord, RepoError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&id).ok_or(RepoError::NotFound)?;
        job.apply(&transition, OffsetDateTime::now_utc())?;
        Ok(job.clone())
    }

    async fn discard_queued_export_job(&self, id: Uuid) -> Result<bool, RepoError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get(&id) {
            Some(job) if job.status == ExportStatus::Queued => {
                jobs.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_stale_processing(
        &self,
        cutoff: OffsetDateTime,
        error_message: &str,
    ) -> Result<Vec<Uuid>, RepoError> {
        let now = OffsetDateTime::now_utc();
        let mut failed = Vec::new();
        for job in self.jobs.lock().await.values_mut() {
            if job.status == ExportStatus::Processing && job.updated_at < cutoff {
                job.apply(&ExportTransition::fail(error_message), now)?;
                failed.push(job.id);
            }
        }
        Ok(failed)
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    messages: Mutex<Vec<ExportQueueMessage>>,
    unavailable: AtomicBool,
}

impl RecordingQueue {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn messages(&self) -> Vec<ExportQueueMessage> {
        self.messages.lock().await.clone()
    }
}

#[async_trait]
impl ExportQueue for RecordingQueue {
    async fn add_export_job(&self, message: &ExportQueueMessage) -> Result<String, RepoError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepoError::from_persistence("queue connection refused"));
        }
        let mut messages = self.messages.lock().await;
        messages.push(message.clone());
        Ok(messages.len().to_string())
    }
}

#[derive(Default)]
pub struct MemoryArtifacts {
    blobs: Mutex<HashMap<String, Bytes>>,
}

impl MemoryArtifacts {
    pub async fn get_blob(&self, key: &str) -> Option<Bytes> {
        self.blobs.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifacts {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<StoredArtifact, ArtifactError> {
        let size_bytes = bytes.len() as u64;
        self.blobs.lock().await.insert(key.to_string(), bytes);
        Ok(StoredArtifact {
            key: key.to_string(),
            size_bytes,
            checksum: format!("len-{size_bytes}"),
        })
    }

    async fn get(&self, key: &str) -> Result<Bytes, ArtifactError> {
        self.get_blob(key)
            .await
            .ok_or_else(|| ArtifactError::NotFound(key.to_string()))
    }
}

/// Every fake plus an [`ExportService`] wired to them.
pub struct Harness {
    pub decks: Arc<MemoryDecks>,
    pub jobs: Arc<MemoryExportJobs>,
    pub queue: Arc<RecordingQueue>,
    pub artifacts: Arc<MemoryArtifacts>,
    pub exports: Arc<ExportService>,
}

impl Harness {
    pub fn new() -> Self {
        let decks = Arc::new(MemoryDecks::default());
        let jobs = Arc::new(MemoryExportJobs::default());
        let queue = Arc::new(RecordingQueue::default());
        let artifacts = Arc::new(MemoryArtifacts::default());
        let exports = Arc::new(ExportService::new(
            decks.clone(),
            jobs.clone(),
            queue.clone(),
            artifacts.clone(),
            "default",
        ));

        Self {
            decks,
            jobs,
            queue,
            artifacts,
            exports,
        }
    }

    pub async fn seed_deck(&self, workspace_id: Uuid, document: Deck) -> DeckRecord {
        let deck = deck_record(workspace_id, document);
        self.decks.insert(deck.clone()).await;
        deck
    }
}

pub fn deck_record(workspace_id: Uuid, document: Deck) -> DeckRecord {
    DeckRecord {
        id: Uuid::new_v4(),
        workspace_id,
        theme_id: None,
        brand: BrandFields::default(),
        document,
        updated_at: OffsetDateTime::now_utc(),
    }
}

/// Cover, a stats slide with three stats and bullets, and a single-stat slide.
pub fn example_deck() -> Deck {
    serde_json::from_value(json!({
        "meta": { "title": "Quarterly review", "language": "en" },
        "slides": [
            { "type": "cover", "layoutVariant": "centered", "blocks": [
                { "kind": "title", "text": "Quarterly review" },
                { "kind": "text", "text": "Prepared for the board" }
            ]},
            { "type": "stats", "blocks": [
                { "kind": "title", "text": "Highlights" },
                { "kind": "stat_block", "value": "42%", "label": "Growth", "sublabel": "YoY" },
                { "kind": "stat_block", "value": "1.2M", "label": "Users" },
                { "kind": "stat_block", "value": "99.9%", "label": "Uptime", "sublabel": "trailing 90 days" },
                { "kind": "bullets", "items": ["Hiring on plan", "Two new regions"] }
            ]},
            { "type": "stats", "blocks": [
                { "kind": "stat_block", "value": "$4M", "label": "ARR" }
            ]}
        ]
    }))
    .expect("example deck parses")
}

/// One slide whose second block has a kind the renderer does not know.
pub fn deck_with_unknown_block(kind: &str) -> Deck {
    serde_json::from_value(json!({
        "meta": { "title": "Roadmap" },
        "slides": [
            { "type": "content", "blocks": [
                { "kind": "title", "text": "Roadmap" },
                { "kind": kind, "series": [1, 2, 3] }
            ]}
        ]
    }))
    .expect("deck parses")
}
