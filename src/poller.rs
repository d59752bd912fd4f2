use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::DatasetError;
use crate::source::DatasetSource;
use crate::store::DatasetStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollFailure {
    pub id: String,
    pub message: String,
}

/// Outcome of one polling round. Failures are per record; one dataset's
/// status error never aborts the round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub updated: Vec<String>,
    pub removed: Vec<String>,
    pub failed: Vec<PollFailure>,
    pub still_processing: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchReport {
    pub rounds: u32,
    pub settled: bool,
    pub last: PollReport,
}

/// Drives the status endpoint for records that are mid-pipeline and patches
/// the answers into the store.
#[derive(Debug, Clone, Copy)]
pub struct StatusPoller {
    interval: Duration,
    max_rounds: u32,
}

impl StatusPoller {
    pub fn new(interval: Duration, max_rounds: u32) -> Self {
        Self {
            interval,
            max_rounds: max_rounds.max(1),
        }
    }

    pub async fn poll_once<S: DatasetSource>(
        &self,
        store: &DatasetStore<S>,
    ) -> PollReport {
        let ids: Vec<String> = store
            .list()
            .into_iter()
            .filter(|record| record.is_processing())
            .map(|record| record.id)
            .collect();

        let source = store.source();
        let answers = join_all(ids.iter().map(|id| source.retrieve_status(id))).await;

        let mut report = PollReport::default();
        for (id, answer) in ids.into_iter().zip(answers) {
            match answer {
                Ok(patch) => {
                    if store.patch(&id, &patch) {
                        report.updated.push(id);
                    }
                }
                Err(DatasetError::DatasetNotFound(_)) => {
                    debug!(%id, "dataset vanished on the server");
                    if store.remove(&id) {
                        report.removed.push(id);
                    }
                }
                Err(err) => {
                    warn!(%id, error = %err, "dataset status poll failed");
                    report.failed.push(PollFailure {
                        id,
                        message: err.to_string(),
                    });
                }
            }
        }
        report.still_processing = store.processing_count();
        report
    }

    /// Polls until no record is processing or the round budget runs out.
    pub async fn watch<S: DatasetSource>(&self, store: &DatasetStore<S>) -> WatchReport {
        let mut rounds = 0;
        let mut last = PollReport {
            still_processing: store.processing_count(),
            ..PollReport::default()
        };
        while last.still_processing > 0 && rounds < self.max_rounds {
            if rounds > 0 {
                tokio::time::sleep(self.interval).await;
            }
            last = self.poll_once(store).await;
            rounds += 1;
            debug!(rounds, still_processing = last.still_processing, "poll round done");
        }
        let settled = last.still_processing == 0;
        info!(rounds, settled, "status watch finished");
        WatchReport {
            rounds,
            settled,
            last,
        }
    }
}
