use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::CollectionSummary;
use crate::domain::{DatasetRecord, Stage};
use crate::error::DatasetError;
use crate::poller::{StatusPoller, WatchReport};
use crate::source::DatasetSource;
use crate::store::DatasetStore;

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub datasets: Vec<ListEntry>,
    pub summary: CollectionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListEntry {
    pub id: String,
    pub name: String,
    pub parse: String,
    pub chunk: String,
    pub vectorize: String,
    pub embedding: String,
    pub row_count: u64,
    pub column_count: u32,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&DatasetRecord> for ListEntry {
    fn from(record: &DatasetRecord) -> Self {
        let label = |stage: Stage| stage.status_label(record.status(stage)).to_string();
        Self {
            id: record.id.clone(),
            name: record.display_name().to_string(),
            parse: label(Stage::Parse),
            chunk: label(Stage::Chunk),
            vectorize: label(Stage::Vectorize),
            embedding: label(Stage::Embedding),
            row_count: record.row_count,
            column_count: record.column_count,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub dataset: DatasetRecord,
    pub stages: Vec<StageInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageInfo {
    pub stage: Stage,
    pub status: String,
    pub progress: Option<u8>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResult {
    pub summary: CollectionSummary,
    pub fetched_at: Option<DateTime<Utc>>,
    pub fresh: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchResult {
    pub watch: WatchReport,
    pub summary: CollectionSummary,
}

/// Command layer over a [`DatasetStore`]. Owns nothing the store does not;
/// it only shapes results for output.
pub struct App<S> {
    store: DatasetStore<S>,
    poller: StatusPoller,
}

impl<S: DatasetSource + 'static> App<S> {
    pub fn new(store: DatasetStore<S>, poller: StatusPoller) -> Self {
        Self { store, poller }
    }

    pub fn store(&self) -> &DatasetStore<S> {
        &self.store
    }

    pub async fn list(&self, refresh: bool) -> Result<ListResult, DatasetError> {
        let records = self.store.fetch_collection(refresh).await?;
        Ok(ListResult {
            datasets: records.iter().map(ListEntry::from).collect(),
            summary: self.store.summary(),
        })
    }

    pub async fn info(&self, id: &str) -> Result<InfoResult, DatasetError> {
        self.store.fetch_collection(false).await?;
        let dataset = self
            .store
            .get_by_id(id)
            .ok_or_else(|| DatasetError::DatasetNotFound(id.to_string()))?;
        let stages = Stage::ALL
            .iter()
            .map(|&stage| StageInfo {
                stage,
                status: stage.status_label(dataset.status(stage)).to_string(),
                progress: dataset.progress(stage),
                error: dataset.stage_error(stage).map(str::to_string),
            })
            .collect();
        Ok(InfoResult { dataset, stages })
    }

    pub async fn stats(&self) -> Result<StatsResult, DatasetError> {
        self.store.fetch_collection(false).await?;
        Ok(StatsResult {
            summary: self.store.summary(),
            fetched_at: self.store.last_fetched_at(),
            fresh: self.store.is_fresh(),
        })
    }

    /// Loads the collection, then polls in-progress records until they settle.
    pub async fn watch(&self) -> Result<WatchResult, DatasetError> {
        self.store.fetch_collection(false).await?;
        let watch = self.poller.watch(&self.store).await;
        Ok(WatchResult {
            watch,
            summary: self.store.summary(),
        })
    }
}
