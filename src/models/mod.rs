use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::entities::file_records;

/// Persisted lifecycle of a file record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// Row written, object upload not yet confirmed. Never visible to readers.
    Pending,
    /// Object confirmed in the bucket.
    Committed,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::Committed => "committed",
        }
    }
}

/// Metadata describing one uploaded file
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    pub id: i32,
    /// Display name supplied by the uploader
    pub name: String,
    /// Object key inside the bucket
    pub storage_key: String,
    pub content_type: Option<String>,
    pub size: i64,
    pub created_at: DateTime<Utc>,
}

impl From<file_records::Model> for FileRecord {
    fn from(model: file_records::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            storage_key: model.storage_key,
            content_type: model.content_type,
            size: model.size,
            created_at: model.created_at,
        }
    }
}

/// Short-lived, credential-bearing read URL for a private object
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
