use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;

use chatbi_dataset_cache::app::App;
use chatbi_dataset_cache::domain::{DatasetRecord, Stage, StageStatus};
use chatbi_dataset_cache::error::DatasetError;
use chatbi_dataset_cache::poller::StatusPoller;
use chatbi_dataset_cache::source::DatasetSource;
use chatbi_dataset_cache::store::DatasetStore;

#[derive(Default)]
struct MockSource {
    records: Vec<DatasetRecord>,
    calls: AtomicUsize,
}

#[async_trait]
impl DatasetSource for MockSource {
    async fn retrieve_collection(&self) -> Result<Vec<DatasetRecord>, DatasetError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records.clone())
    }
}

fn app(records: Vec<DatasetRecord>) -> App<MockSource> {
    let store = DatasetStore::new(MockSource {
        records,
        ..MockSource::default()
    });
    App::new(store, StatusPoller::new(Duration::from_millis(1), 1))
}

fn sample() -> Vec<DatasetRecord> {
    let mut named = DatasetRecord::new("d1", "raw_upload.xlsx")
        .with_status(Stage::Parse, StageStatus::Completed)
        .with_status(Stage::Chunk, StageStatus::InProgress);
    named.logical_name = Some("Quarterly sales".to_string());
    named.chunk_progress = Some(30);
    let failed = DatasetRecord::new("d2", "broken.csv").with_status(Stage::Parse, StageStatus::Failed);
    vec![named, failed]
}

#[tokio::test]
async fn list_uses_stage_labels_and_cache() {
    let app = app(sample());

    let result = app.list(false).await.unwrap();
    app.list(false).await.unwrap();

    assert_eq!(app.store().source().calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.datasets.len(), 2);
    let first = &result.datasets[0];
    assert_eq!(first.name, "Quarterly sales");
    assert_eq!(first.parse, "parsed");
    assert_eq!(first.chunk, "chunking");
    assert_eq!(first.vectorize, "pending");
    assert_eq!(result.summary.processing, 1);
    assert_eq!(result.summary.failed, 1);
}

#[tokio::test]
async fn list_refresh_goes_to_source() {
    let app = app(sample());

    app.list(false).await.unwrap();
    app.list(true).await.unwrap();

    assert_eq!(app.store().source().calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn info_reports_stage_details() {
    let app = app(sample());

    let info = app.info("d1").await.unwrap();

    assert_eq!(info.dataset.id, "d1");
    assert_eq!(info.stages.len(), 4);
    assert_eq!(info.stages[1].stage, Stage::Chunk);
    assert_eq!(info.stages[1].status, "chunking");
    assert_eq!(info.stages[1].progress, Some(30));
}

#[tokio::test]
async fn info_unknown_id_is_not_found() {
    let app = app(sample());
    let err = app.info("nope").await.unwrap_err();
    assert_matches!(err, DatasetError::DatasetNotFound(_));
}

#[tokio::test]
async fn stats_marks_fresh_after_fetch() {
    let app = app(sample());

    let stats = app.stats().await.unwrap();

    assert_eq!(stats.summary.total, 2);
    assert_eq!(stats.summary.completed, 0);
    assert!(stats.fetched_at.is_some());
    assert!(stats.fresh);
}

#[tokio::test]
async fn watch_reports_unsupported_status_as_failures() {
    let app = app(sample());

    let result = app.watch().await.unwrap();

    assert!(!result.watch.settled);
    assert_eq!(result.watch.rounds, 1);
    assert_eq!(result.watch.last.failed.len(), 1);
    assert_eq!(result.watch.last.failed[0].id, "d1");
    assert_eq!(result.summary.processing, 1);
}
