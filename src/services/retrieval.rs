use crate::models::SignedUrl;
use crate::services::error::IngestError;
use crate::services::metadata_store::MetadataStore;
use crate::services::object_store::ObjectStore;
use std::sync::Arc;

/// Turns a record id into a short-lived read URL for its object.
pub struct RetrievalResolver {
    store: MetadataStore,
    objects: Arc<dyn ObjectStore>,
    ttl_secs: u64,
    verify_object: bool,
}

impl RetrievalResolver {
    pub fn new(
        store: MetadataStore,
        objects: Arc<dyn ObjectStore>,
        ttl_secs: u64,
        verify_object: bool,
    ) -> Self {
        Self {
            store,
            objects,
            ttl_secs,
            verify_object,
        }
    }

    /// Sign a URL for record `id`.
    ///
    /// With verification off, a record whose object has disappeared from the
    /// bucket still yields a URL; the bucket answers 404 when it is followed.
    pub async fn resolve(&self, id: i32) -> Result<SignedUrl, IngestError> {
        let record = self.store.find_by_id(id).await?;

        if self.verify_object && !self.objects.object_exists(&record.storage_key).await? {
            return Err(IngestError::ObjectMissing {
                key: record.storage_key,
            });
        }

        let signed = self
            .objects
            .signed_url(&record.storage_key, self.ttl_secs)
            .await?;

        tracing::info!(
            "📎 Signed URL for record {} ({}) valid until {}",
            record.id,
            record.storage_key,
            signed.expires_at
        );
        Ok(signed)
    }
}
