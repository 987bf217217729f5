use crate::AppState;
use crate::api::error::AppError;
use crate::models::FileRecord;
use crate::services::error::IngestError;
use crate::utils::validation::sanitize_filename;
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    response::Redirect,
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Multipart body accepted by `/upload`
#[derive(ToSchema)]
pub struct UploadForm {
    /// The file to store; the part's filename becomes the record name
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct FileListResponse {
    pub files: Vec<FileRecord>,
}

fn multipart_error(e: MultipartError, limit: usize) -> AppError {
    let msg = e.to_string();
    if msg.contains("length limit exceeded") {
        AppError::Ingest(IngestError::PayloadTooLarge { limit })
    } else {
        AppError::BadRequest(msg)
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = UploadForm, content_type = "multipart/form-data", description = "File upload"),
    responses(
        (status = 303, description = "Stored; redirects to the listing"),
        (status = 400, description = "No file in the request or unusable filename"),
        (status = 413, description = "File too large"),
        (status = 502, description = "Object storage rejected the upload"),
        (status = 503, description = "Metadata store unavailable")
    ),
    tag = "files"
)]
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Redirect, AppError> {
    let result: Result<FileRecord, AppError> = async {
        let mut staged = None;

        let limit = state.config.max_file_size;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| multipart_error(e, limit))?
        {
            // Plain form fields and any extra files are skipped
            let Some(original_filename) = field.file_name().map(str::to_string) else {
                continue;
            };
            if staged.is_some() {
                tracing::debug!("Ignoring additional file part '{}'", original_filename);
                continue;
            }

            let filename = sanitize_filename(&original_filename)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            let content_type = field.content_type().map(str::to_string);

            let body_with_io_error = field.map_err(std::io::Error::other);
            let reader = StreamReader::new(body_with_io_error);

            staged = Some(
                state
                    .stage
                    .stage(&filename, content_type.as_deref(), reader)
                    .await?,
            );
        }

        let staged = staged.ok_or(AppError::BadRequest("No file provided".to_string()))?;

        // Detached so a client hanging up cannot cut the pipeline off midway
        let pipeline = state.ingest.clone();
        let record = tokio::spawn(async move { pipeline.ingest(staged).await })
            .await
            .map_err(|e| AppError::Internal(format!("Ingest task failed: {}", e)))??;

        Ok(record)
    }
    .await;

    match result {
        Ok(record) => {
            tracing::info!("📦 Upload complete: {} -> record {}", record.name, record.id);
            Ok(Redirect::to("/"))
        }
        Err(e) => {
            // Drain what is left so the client sees our error instead of a reset connection
            tracing::warn!("Upload failed: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/files",
    responses(
        (status = 200, description = "All stored files, oldest first", body = FileListResponse),
        (status = 503, description = "Metadata store unavailable")
    ),
    tag = "files"
)]
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListResponse>, AppError> {
    let files = state.store.list_all().await?;
    Ok(Json(FileListResponse { files }))
}

#[utoipa::path(
    get,
    path = "/files/{id}",
    params(
        ("id" = i32, Path, description = "File record id")
    ),
    responses(
        (status = 303, description = "Redirect to a short-lived signed URL"),
        (status = 400, description = "Malformed id"),
        (status = 404, description = "Unknown record, or its object is missing"),
        (status = 503, description = "Metadata store or object storage unavailable")
    ),
    tag = "files"
)]
pub async fn retrieve_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect, AppError> {
    let id: i32 = id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid file id '{}'", id)))?;

    let signed = state.resolver.resolve(id).await?;
    Ok(Redirect::to(&signed.url))
}
