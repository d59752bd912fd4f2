use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::DatasetError;

/// Processing stages a dataset passes through on the server, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Chunk,
    Vectorize,
    Embedding,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Parse, Stage::Chunk, Stage::Vectorize, Stage::Embedding];

    /// Label the server uses for `status` on this stage.
    pub fn status_label(self, status: StageStatus) -> &'static str {
        match (self, status) {
            (_, StageStatus::Pending) => "pending",
            (_, StageStatus::Failed) => "failed",
            (Stage::Parse, StageStatus::InProgress) => "parsing",
            (Stage::Parse, StageStatus::Completed) => "parsed",
            (Stage::Chunk, StageStatus::InProgress) => "chunking",
            (Stage::Vectorize, StageStatus::InProgress) => "vectorizing",
            (Stage::Embedding, StageStatus::InProgress) => "embedding",
            (_, StageStatus::Completed) => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Parse => write!(f, "parse"),
            Stage::Chunk => write!(f, "chunk"),
            Stage::Vectorize => write!(f, "vectorize"),
            Stage::Embedding => write!(f, "embedding"),
        }
    }
}

/// Lifecycle state of a single stage. Stage-specific wire labels
/// (`parsing`, `parsed`, `chunking`, ...) are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    #[serde(
        alias = "in-progress",
        alias = "parsing",
        alias = "chunking",
        alias = "vectorizing",
        alias = "embedding"
    )]
    InProgress,
    #[serde(alias = "parsed")]
    Completed,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "pending"),
            StageStatus::InProgress => write!(f, "in_progress"),
            StageStatus::Completed => write!(f, "completed"),
            StageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for StageStatus {
    type Err = DatasetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(StageStatus::Pending),
            "in_progress" | "in-progress" | "parsing" | "chunking" | "vectorizing"
            | "embedding" => Ok(StageStatus::InProgress),
            "completed" | "parsed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            _ => Err(DatasetError::InvalidStageStatus(value.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub parse_status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_progress: Option<u8>,
    #[serde(
        default,
        rename = "error_message",
        skip_serializing_if = "Option::is_none"
    )]
    pub parse_error: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub chunk_status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_error: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub vectorize_status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectorize_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vectorize_error: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub embedding_status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_progress: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_error: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub row_count: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub column_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DatasetRecord {
    /// A record with every stage pending and no metadata.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            logical_name: None,
            description: None,
            parse_status: StageStatus::Pending,
            parse_progress: None,
            parse_error: None,
            chunk_status: StageStatus::Pending,
            chunk_progress: None,
            chunk_error: None,
            vectorize_status: StageStatus::Pending,
            vectorize_progress: None,
            vectorize_error: None,
            embedding_status: StageStatus::Pending,
            embedding_progress: None,
            embedding_error: None,
            row_count: 0,
            column_count: 0,
            file_size: None,
            created_at: None,
            updated_at: None,
        }
    }

    pub fn with_status(mut self, stage: Stage, status: StageStatus) -> Self {
        *self.stage_mut(stage).status = status;
        self
    }

    pub fn display_name(&self) -> &str {
        self.logical_name.as_deref().unwrap_or(&self.name)
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        match stage {
            Stage::Parse => self.parse_status,
            Stage::Chunk => self.chunk_status,
            Stage::Vectorize => self.vectorize_status,
            Stage::Embedding => self.embedding_status,
        }
    }

    pub fn progress(&self, stage: Stage) -> Option<u8> {
        match stage {
            Stage::Parse => self.parse_progress,
            Stage::Chunk => self.chunk_progress,
            Stage::Vectorize => self.vectorize_progress,
            Stage::Embedding => self.embedding_progress,
        }
    }

    pub fn stage_error(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Parse => self.parse_error.as_deref(),
            Stage::Chunk => self.chunk_error.as_deref(),
            Stage::Vectorize => self.vectorize_error.as_deref(),
            Stage::Embedding => self.embedding_error.as_deref(),
        }
    }

    /// Every stage has completed.
    pub fn is_completed(&self) -> bool {
        Stage::ALL
            .iter()
            .all(|stage| self.status(*stage) == StageStatus::Completed)
    }

    /// At least one stage is in progress.
    pub fn is_processing(&self) -> bool {
        Stage::ALL
            .iter()
            .any(|stage| self.status(*stage) == StageStatus::InProgress)
    }

    /// At least one stage has failed.
    pub fn is_failed(&self) -> bool {
        Stage::ALL
            .iter()
            .any(|stage| self.status(*stage) == StageStatus::Failed)
    }

    fn stage_mut(&mut self, stage: Stage) -> StageSlots<'_> {
        match stage {
            Stage::Parse => StageSlots {
                status: &mut self.parse_status,
                progress: &mut self.parse_progress,
                error: &mut self.parse_error,
            },
            Stage::Chunk => StageSlots {
                status: &mut self.chunk_status,
                progress: &mut self.chunk_progress,
                error: &mut self.chunk_error,
            },
            Stage::Vectorize => StageSlots {
                status: &mut self.vectorize_status,
                progress: &mut self.vectorize_progress,
                error: &mut self.vectorize_error,
            },
            Stage::Embedding => StageSlots {
                status: &mut self.embedding_status,
                progress: &mut self.embedding_progress,
                error: &mut self.embedding_error,
            },
        }
    }
}

struct StageSlots<'a> {
    status: &'a mut StageStatus,
    progress: &'a mut Option<u8>,
    error: &'a mut Option<String>,
}

/// Partial update merged into an existing record. `None` leaves the field
/// untouched, so a patch can never clear an optional field.
///
/// The status endpoint's response body deserializes directly into a patch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetPatch {
    pub name: Option<String>,
    pub logical_name: Option<String>,
    pub description: Option<String>,
    pub parse_status: Option<StageStatus>,
    pub parse_progress: Option<u8>,
    #[serde(rename = "error_message")]
    pub parse_error: Option<String>,
    pub chunk_status: Option<StageStatus>,
    pub chunk_progress: Option<u8>,
    pub chunk_error: Option<String>,
    pub vectorize_status: Option<StageStatus>,
    pub vectorize_progress: Option<u8>,
    pub vectorize_error: Option<String>,
    pub embedding_status: Option<StageStatus>,
    pub embedding_progress: Option<u8>,
    pub embedding_error: Option<String>,
    pub row_count: Option<u64>,
    pub column_count: Option<u32>,
    pub file_size: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl DatasetPatch {
    pub fn status(mut self, stage: Stage, status: StageStatus) -> Self {
        match stage {
            Stage::Parse => self.parse_status = Some(status),
            Stage::Chunk => self.chunk_status = Some(status),
            Stage::Vectorize => self.vectorize_status = Some(status),
            Stage::Embedding => self.embedding_status = Some(status),
        }
        self
    }

    /// Progress is clamped to 100.
    pub fn progress(mut self, stage: Stage, progress: u8) -> Self {
        let progress = Some(progress.min(100));
        match stage {
            Stage::Parse => self.parse_progress = progress,
            Stage::Chunk => self.chunk_progress = progress,
            Stage::Vectorize => self.vectorize_progress = progress,
            Stage::Embedding => self.embedding_progress = progress,
        }
        self
    }

    pub fn error(mut self, stage: Stage, message: impl Into<String>) -> Self {
        let message = Some(message.into());
        match stage {
            Stage::Parse => self.parse_error = message,
            Stage::Chunk => self.chunk_error = message,
            Stage::Vectorize => self.vectorize_error = message,
            Stage::Embedding => self.embedding_error = message,
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply(&self, record: &mut DatasetRecord) {
        merge(&mut record.name, &self.name);
        merge_opt(&mut record.logical_name, &self.logical_name);
        merge_opt(&mut record.description, &self.description);

        let stages = [
            (Stage::Parse, self.parse_status, self.parse_progress, &self.parse_error),
            (Stage::Chunk, self.chunk_status, self.chunk_progress, &self.chunk_error),
            (
                Stage::Vectorize,
                self.vectorize_status,
                self.vectorize_progress,
                &self.vectorize_error,
            ),
            (
                Stage::Embedding,
                self.embedding_status,
                self.embedding_progress,
                &self.embedding_error,
            ),
        ];
        for (stage, status, progress, error) in stages {
            let slots = record.stage_mut(stage);
            merge(slots.status, &status);
            if let Some(progress) = progress {
                *slots.progress = Some(progress.min(100));
            }
            merge_opt(slots.error, error);
        }

        merge(&mut record.row_count, &self.row_count);
        merge(&mut record.column_count, &self.column_count);
        merge_opt(&mut record.file_size, &self.file_size);
        merge_opt(&mut record.updated_at, &self.updated_at);
    }
}

fn merge<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

fn merge_opt<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

/// Explicit `null` on the wire reads as the field's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
