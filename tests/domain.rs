use assert_matches::assert_matches;
use serde_json::json;

use chatbi_dataset_cache::domain::{DatasetPatch, DatasetRecord, Stage, StageStatus};
use chatbi_dataset_cache::error::DatasetError;

#[test]
fn decode_list_entry_with_stage_labels() {
    let record: DatasetRecord = serde_json::from_value(json!({
        "id": "d1",
        "name": "orders.xlsx",
        "logical_name": "Orders",
        "parse_status": "parsed",
        "chunk_status": "chunking",
        "vectorize_status": null,
        "row_count": 1200,
        "column_count": 14,
        "created_at": "2024-05-01T08:30:00.123456+00:00"
    }))
    .unwrap();

    assert_eq!(record.display_name(), "Orders");
    assert_eq!(record.status(Stage::Parse), StageStatus::Completed);
    assert_eq!(record.status(Stage::Chunk), StageStatus::InProgress);
    assert_eq!(record.status(Stage::Vectorize), StageStatus::Pending);
    assert_eq!(record.status(Stage::Embedding), StageStatus::Pending);
    assert!(record.is_processing());
    assert!(!record.is_completed());
    assert_eq!(record.row_count, 1200);
}

#[test]
fn decode_parse_error_from_error_message() {
    let record: DatasetRecord = serde_json::from_value(json!({
        "id": "d2",
        "name": "broken.csv",
        "parse_status": "failed",
        "error_message": "unsupported encoding"
    }))
    .unwrap();

    assert!(record.is_failed());
    assert_eq!(record.stage_error(Stage::Parse), Some("unsupported encoding"));
}

#[test]
fn unknown_status_label_rejected() {
    let result = serde_json::from_value::<DatasetRecord>(json!({
        "id": "d3",
        "name": "x.csv",
        "parse_status": "queued"
    }));
    assert!(result.is_err());

    let err = "queued".parse::<StageStatus>().unwrap_err();
    assert_matches!(err, DatasetError::InvalidStageStatus(_));
}

#[test]
fn completed_requires_every_stage() {
    let three = DatasetRecord::new("d1", "sales.csv")
        .with_status(Stage::Parse, StageStatus::Completed)
        .with_status(Stage::Chunk, StageStatus::Completed)
        .with_status(Stage::Vectorize, StageStatus::Completed);
    assert!(!three.is_completed());

    let four = three.with_status(Stage::Embedding, StageStatus::Completed);
    assert!(four.is_completed());
    assert!(!four.is_processing());
    assert!(!four.is_failed());
}

#[test]
fn patch_sets_error_and_clamps_progress() {
    let mut record = DatasetRecord::new("d1", "sales.csv");

    let patch = DatasetPatch::default()
        .status(Stage::Vectorize, StageStatus::Failed)
        .progress(Stage::Vectorize, 250)
        .error(Stage::Vectorize, "embedding model offline");
    assert!(!patch.is_empty());
    patch.apply(&mut record);

    assert_eq!(record.progress(Stage::Vectorize), Some(100));
    assert_eq!(record.stage_error(Stage::Vectorize), Some("embedding model offline"));
    assert!(record.is_failed());
}

#[test]
fn empty_patch_changes_nothing() {
    let mut record = DatasetRecord::new("d1", "sales.csv")
        .with_status(Stage::Parse, StageStatus::InProgress);
    let before = record.clone();

    let patch = DatasetPatch::default();
    assert!(patch.is_empty());
    patch.apply(&mut record);

    assert_eq!(record, before);
}

#[test]
fn serialize_uses_snake_case_status() {
    let record = DatasetRecord::new("d1", "sales.csv")
        .with_status(Stage::Chunk, StageStatus::InProgress);
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["chunk_status"], "in_progress");
    assert_eq!(value["parse_status"], "pending");
}

#[test]
fn null_counts_decode_as_zero() {
    let record: DatasetRecord = serde_json::from_value(json!({
        "id": "legacy",
        "name": "old_upload.csv",
        "parse_status": "parsed",
        "row_count": null,
        "column_count": null
    }))
    .unwrap();

    assert_eq!(record.row_count, 0);
    assert_eq!(record.column_count, 0);
    assert_eq!(record.status(Stage::Parse), StageStatus::Completed);
}
