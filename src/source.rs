use async_trait::async_trait;

use crate::domain::{DatasetPatch, DatasetRecord};
use crate::error::DatasetError;

/// Remote side of the cache. Implementations own transport concerns
/// (timeouts, retries, auth); the cache forwards their failures as-is.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    /// Full snapshot of the collection in display order.
    async fn retrieve_collection(&self) -> Result<Vec<DatasetRecord>, DatasetError>;

    /// Current pipeline state of one dataset.
    async fn retrieve_status(&self, id: &str) -> Result<DatasetPatch, DatasetError> {
        let _ = id;
        Err(DatasetError::StatusUnsupported)
    }
}
