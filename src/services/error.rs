use thiserror::Error;

/// Failures of the upload-store-retrieve pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Metadata store unavailable: {0}")]
    StoreUnavailable(#[from] sea_orm::DbErr),

    #[error("Object upload failed: {cause}")]
    UploadFailed { cause: anyhow::Error },

    #[error("Object storage unavailable: {cause}")]
    ObjectStoreUnavailable { cause: anyhow::Error },

    #[error("Cannot sign URL: {0}")]
    SigningFailed(String),

    #[error("File record {0} not found")]
    RecordNotFound(i32),

    #[error("Object '{key}' is missing from the bucket")]
    ObjectMissing { key: String },

    #[error("Local file error: {0}")]
    LocalIo(#[from] std::io::Error),

    #[error("File exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
}

impl IngestError {
    pub fn upload_failed(cause: impl Into<anyhow::Error>) -> Self {
        IngestError::UploadFailed {
            cause: cause.into(),
        }
    }

    pub fn object_store_unavailable(cause: impl Into<anyhow::Error>) -> Self {
        IngestError::ObjectStoreUnavailable {
            cause: cause.into(),
        }
    }
}
