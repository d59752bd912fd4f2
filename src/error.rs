use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DatasetError {
    #[error("dataset request failed: {0}")]
    SourceHttp(String),

    #[error("dataset service returned status {status}: {message}")]
    SourceStatus { status: u16, message: String },

    #[error("failed to decode dataset response: {0}")]
    SourceDecode(String),

    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("dataset retrieval was cancelled before it settled")]
    RetrievalCancelled,

    #[error("status polling is not supported by this source")]
    StatusUnsupported,

    #[error("invalid stage status label: {0}")]
    InvalidStageStatus(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),
}

impl DatasetError {
    /// True for failures that originate at the remote service or transport.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            DatasetError::SourceHttp(_)
                | DatasetError::SourceStatus { .. }
                | DatasetError::SourceDecode(_)
        )
    }
}
