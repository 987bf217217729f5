use crate::entities::file_records;
use crate::models::FileRecord;
use crate::services::error::IngestError;
use crate::services::metadata_store::MetadataStore;
use crate::services::object_store::ObjectStore;
use crate::services::staging::StagedFile;
use std::sync::Arc;

/// Where an ingest currently stands.
///
/// ```text
/// Staged -> Pending -> Uploaded -> Committed
///              |          |
///              +----------+-> Failed -> Purged
/// Staged -> Aborted            (metadata store refused the row)
/// ```
#[derive(Debug)]
enum IngestState {
    Staged(StagedFile),
    Pending {
        staged: StagedFile,
        record: file_records::Model,
    },
    Uploaded {
        record: file_records::Model,
    },
    Failed {
        record: file_records::Model,
        error: IngestError,
    },
    Committed(FileRecord),
    Purged(IngestError),
    Aborted(IngestError),
}

impl IngestState {
    fn name(&self) -> &'static str {
        match self {
            IngestState::Staged(_) => "staged",
            IngestState::Pending { .. } => "pending",
            IngestState::Uploaded { .. } => "uploaded",
            IngestState::Failed { .. } => "failed",
            IngestState::Committed(_) => "committed",
            IngestState::Purged(_) => "purged",
            IngestState::Aborted(_) => "aborted",
        }
    }
}

/// Object key for an upload. Currently the sanitized display name itself, so
/// concurrent uploads of the same name overwrite each other's object.
pub fn storage_key_for(name: &str) -> String {
    name.to_string()
}

/// Moves a staged upload into the bucket and records it, keeping the two
/// stores in agreement: a committed record always has its object.
pub struct IngestPipeline {
    store: MetadataStore,
    objects: Arc<dyn ObjectStore>,
}

impl IngestPipeline {
    pub fn new(store: MetadataStore, objects: Arc<dyn ObjectStore>) -> Self {
        Self { store, objects }
    }

    /// Run a staged file through the pipeline. The staged file is released
    /// before this returns, whatever the outcome.
    pub async fn ingest(&self, staged: StagedFile) -> Result<FileRecord, IngestError> {
        let name = staged.original_name.clone();
        let mut state = IngestState::Staged(staged);

        loop {
            state = match state {
                IngestState::Staged(staged) => self.create_record(staged).await,
                IngestState::Pending { staged, record } => self.upload(staged, record).await,
                IngestState::Uploaded { record } => self.commit(record).await,
                IngestState::Failed { record, error } => self.compensate(record, error).await,
                IngestState::Committed(record) => {
                    tracing::info!("✅ Ingested '{}' as record {}", name, record.id);
                    return Ok(record);
                }
                IngestState::Purged(error) | IngestState::Aborted(error) => {
                    tracing::warn!("❌ Ingest of '{}' failed: {}", name, error);
                    return Err(error);
                }
            };
            tracing::debug!(file = %name, state = state.name(), "ingest transition");
        }
    }

    async fn create_record(&self, staged: StagedFile) -> IngestState {
        let storage_key = storage_key_for(&staged.original_name);
        let created = self
            .store
            .create_pending(
                &staged.original_name,
                &storage_key,
                Some(&staged.mime_type),
                staged.size as i64,
            )
            .await;

        match created {
            Ok(record) => IngestState::Pending { staged, record },
            Err(error) => {
                release(staged);
                IngestState::Aborted(error)
            }
        }
    }

    async fn upload(&self, staged: StagedFile, record: file_records::Model) -> IngestState {
        let result = self
            .objects
            .put_object(staged.path(), &record.storage_key, &staged.mime_type)
            .await;

        // The local copy is no longer needed either way.
        release(staged);

        match result {
            Ok(()) => IngestState::Uploaded { record },
            Err(error) => IngestState::Failed { record, error },
        }
    }

    async fn commit(&self, record: file_records::Model) -> IngestState {
        match self.store.mark_committed(record.clone()).await {
            Ok(committed) => IngestState::Committed(committed),
            Err(error) => IngestState::Failed { record, error },
        }
    }

    async fn compensate(&self, record: file_records::Model, error: IngestError) -> IngestState {
        if let Err(purge_error) = self.store.purge(record.id).await {
            tracing::warn!(
                "Could not purge pending record {} ({}); leaving it for the reconciler",
                record.id,
                purge_error
            );
        }
        IngestState::Purged(error)
    }
}

fn release(staged: StagedFile) {
    if let Err(e) = staged.release() {
        tracing::warn!("Failed to remove staged file: {}", e);
    }
}
