use crate::services::error::IngestError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Ingest(e) => match e {
                IngestError::StoreUnavailable(e) => {
                    tracing::error!("Metadata store error: {:?}", e);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Metadata store unavailable".to_string(),
                    )
                }
                IngestError::UploadFailed { cause } => {
                    tracing::error!("Object upload failed: {:?}", cause);
                    (
                        StatusCode::BAD_GATEWAY,
                        "Upload to object storage failed".to_string(),
                    )
                }
                IngestError::ObjectStoreUnavailable { cause } => {
                    tracing::error!("Object storage unreachable: {:?}", cause);
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "Object storage unavailable".to_string(),
                    )
                }
                IngestError::SigningFailed(msg) => {
                    tracing::error!("Signing failed: {}", msg);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Failed to generate download URL".to_string(),
                    )
                }
                e @ IngestError::RecordNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                e @ IngestError::ObjectMissing { .. } => {
                    tracing::warn!("Dangling record: {}", e);
                    (StatusCode::NOT_FOUND, e.to_string())
                }
                IngestError::LocalIo(e) => {
                    tracing::error!("Local I/O error: {:?}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Internal Server Error".to_string(),
                    )
                }
                e @ IngestError::PayloadTooLarge { .. } => {
                    (StatusCode::PAYLOAD_TOO_LARGE, e.to_string())
                }
            },
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
