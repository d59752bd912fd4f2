use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{DatasetPatch, DatasetRecord};
use crate::error::DatasetError;

/// Default freshness window for a fetched collection.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Counts derived from the live collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CollectionSummary {
    pub total: usize,
    pub completed: usize,
    pub processing: usize,
    pub failed: usize,
}

/// Whether an upsert added a new record or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Replaced,
}

/// Ordered, id-indexed mirror of the remote collection.
///
/// Order is insertion order: server order after a fetch, new records appended
/// by [`CollectionCache::upsert`]. Aggregates are always computed by scanning
/// the records. `fetched_at` moves only on [`CollectionCache::replace_all`]
/// and [`CollectionCache::clear`].
#[derive(Debug, Clone, Default)]
pub struct CollectionCache {
    records: Vec<DatasetRecord>,
    positions: HashMap<String, usize>,
    fetched_at: Option<DateTime<Utc>>,
    loading: bool,
    error: Option<DatasetError>,
}

impl CollectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> &[DatasetRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DatasetRecord> {
        self.positions.get(id).map(|&index| &self.records[index])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    pub fn upsert(&mut self, record: DatasetRecord) -> Upsert {
        match self.positions.get(&record.id) {
            Some(&index) => {
                self.records[index] = record;
                Upsert::Replaced
            }
            None => {
                self.positions.insert(record.id.clone(), self.records.len());
                self.records.push(record);
                Upsert::Inserted
            }
        }
    }

    /// Returns `false` without touching anything when `id` is absent.
    pub fn patch(&mut self, id: &str, patch: &DatasetPatch) -> bool {
        match self.positions.get(id) {
            Some(&index) => {
                patch.apply(&mut self.records[index]);
                true
            }
            None => false,
        }
    }

    /// Returns `false` when `id` is absent.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.positions.remove(id) else {
            return false;
        };
        self.records.remove(index);
        for record in &self.records[index..] {
            if let Some(position) = self.positions.get_mut(&record.id) {
                *position -= 1;
            }
        }
        true
    }

    /// Empties the collection and forgets the last fetch and error. The
    /// loading flag belongs to the in-flight fetch and is left alone.
    pub fn clear(&mut self) {
        self.records.clear();
        self.positions.clear();
        self.fetched_at = None;
        self.error = None;
    }

    /// Wholesale replacement with a server snapshot. A duplicate id later in
    /// the snapshot replaces the earlier entry in place.
    pub fn replace_all(&mut self, records: Vec<DatasetRecord>, fetched_at: DateTime<Utc>) {
        self.records.clear();
        self.positions.clear();
        for record in records {
            self.upsert(record);
        }
        self.fetched_at = Some(fetched_at);
        self.loading = false;
        self.error = None;
    }

    pub fn begin_loading(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub fn fail_loading(&mut self, error: DatasetError) {
        self.loading = false;
        self.error = Some(error);
    }

    /// Stops loading without recording an outcome.
    pub fn abort_loading(&mut self) {
        self.loading = false;
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&DatasetError> {
        self.error.as_ref()
    }

    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// An empty collection is never fresh, whatever the timestamp says.
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        if self.records.is_empty() {
            return false;
        }
        let Some(fetched_at) = self.fetched_at else {
            return false;
        };
        match (now - fetched_at).to_std() {
            Ok(elapsed) => elapsed < max_age,
            // clock moved backwards since the fetch
            Err(_) => true,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_completed()).count()
    }

    pub fn processing_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_processing()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.records.iter().filter(|r| r.is_failed()).count()
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            total: self.records.len(),
            completed: self.completed_count(),
            processing: self.processing_count(),
            failed: self.failed_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::domain::{Stage, StageStatus};

    fn record(id: &str) -> DatasetRecord {
        DatasetRecord::new(id, format!("{id}.csv"))
    }

    fn ids(cache: &CollectionCache) -> Vec<&str> {
        cache.list().iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn upsert_appends_and_replaces_in_place() {
        let mut cache = CollectionCache::new();
        assert_eq!(cache.upsert(record("a")), Upsert::Inserted);
        assert_eq!(cache.upsert(record("b")), Upsert::Inserted);

        let renamed = DatasetRecord::new("a", "renamed.csv");
        assert_eq!(cache.upsert(renamed), Upsert::Replaced);

        assert_eq!(ids(&cache), ["a", "b"]);
        assert_eq!(cache.get("a").unwrap().name, "renamed.csv");
    }

    #[test]
    fn remove_keeps_index_consistent() {
        let mut cache = CollectionCache::new();
        for id in ["a", "b", "c", "d"] {
            cache.upsert(record(id));
        }

        assert!(cache.remove("b"));
        assert!(!cache.remove("b"));

        assert_eq!(ids(&cache), ["a", "c", "d"]);
        assert_eq!(cache.get("d").unwrap().id, "d");
        assert_eq!(cache.get("c").unwrap().id, "c");
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn patch_absent_id_is_noop() {
        let mut cache = CollectionCache::new();
        cache.upsert(record("a"));
        let patch = DatasetPatch::default().status(Stage::Parse, StageStatus::Failed);

        assert!(!cache.patch("missing", &patch));
        assert_eq!(cache.failed_count(), 0);
    }

    #[test]
    fn replace_all_dedupes_and_stamps() {
        let mut cache = CollectionCache::new();
        cache.upsert(record("old"));
        cache.fail_loading(DatasetError::SourceHttp("offline".to_string()));

        let now = Utc::now();
        let dup = DatasetRecord::new("a", "second.csv");
        cache.replace_all(vec![record("a"), record("b"), dup], now);

        assert_eq!(ids(&cache), ["a", "b"]);
        assert_eq!(cache.get("a").unwrap().name, "second.csv");
        assert_eq!(cache.fetched_at(), Some(now));
        assert!(cache.error().is_none());
    }

    #[test]
    fn local_mutations_leave_freshness_alone() {
        let mut cache = CollectionCache::new();
        let fetched = Utc::now();
        cache.replace_all(vec![record("a")], fetched);

        cache.upsert(record("b"));
        cache.remove("a");
        cache.patch("b", &DatasetPatch::default().progress(Stage::Parse, 40));

        assert_eq!(cache.fetched_at(), Some(fetched));
    }

    #[test]
    fn freshness_window() {
        let mut cache = CollectionCache::new();
        let fetched = Utc::now();
        let ttl = Duration::from_secs(300);

        cache.replace_all(vec![record("a")], fetched);
        assert!(cache.is_fresh(fetched + TimeDelta::seconds(299), ttl));
        assert!(!cache.is_fresh(fetched + TimeDelta::seconds(300), ttl));
        assert!(cache.is_fresh(fetched - TimeDelta::seconds(5), ttl));
    }

    #[test]
    fn empty_collection_is_never_fresh() {
        let mut cache = CollectionCache::new();
        let fetched = Utc::now();
        cache.replace_all(Vec::new(), fetched);
        assert!(!cache.is_fresh(fetched, DEFAULT_TTL));
    }

    #[test]
    fn clear_resets_everything_but_loading() {
        let mut cache = CollectionCache::new();
        cache.replace_all(vec![record("a")], Utc::now());
        cache.begin_loading();
        cache.fail_loading(DatasetError::SourceHttp("offline".to_string()));
        cache.begin_loading();

        cache.clear();

        assert!(cache.is_empty());
        assert!(cache.fetched_at().is_none());
        assert!(cache.error().is_none());
        assert!(cache.is_loading());
    }

    #[test]
    fn summary_counts_overlap_per_record() {
        let mut cache = CollectionCache::new();
        let done = Stage::ALL
            .iter()
            .fold(record("done"), |r, s| r.with_status(*s, StageStatus::Completed));
        let mixed = record("mixed")
            .with_status(Stage::Parse, StageStatus::Failed)
            .with_status(Stage::Chunk, StageStatus::InProgress);
        cache.upsert(done);
        cache.upsert(mixed);
        cache.upsert(record("idle"));

        assert_eq!(
            cache.summary(),
            CollectionSummary {
                total: 3,
                completed: 1,
                processing: 1,
                failed: 1,
            }
        );
    }
}
