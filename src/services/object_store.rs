use crate::models::SignedUrl;
use crate::services::error::IngestError;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Remote bucket holding the uploaded objects.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `local_path` under `key`. Returns once the service
    /// has acknowledged the write.
    async fn put_object(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), IngestError>;

    /// Produce a read URL for `key` valid for `ttl_secs` seconds. The URL is
    /// computed locally; the object is not checked.
    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<SignedUrl, IngestError>;

    async fn object_exists(&self, key: &str) -> Result<bool, IngestError>;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

/// An anonymous client presigns without complaint and yields a bare URL; only
/// a URL carrying a signature grants access to a private object.
fn has_signature(uri: &str) -> bool {
    url::Url::parse(uri)
        .map(|url| url.query_pairs().any(|(k, _)| k == "X-Amz-Signature"))
        .unwrap_or(false)
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), IngestError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(IngestError::upload_failed)?;

        let res = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(body)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 put_object failed: bucket={}, key={}, error={:?}",
                self.bucket,
                key,
                e
            );
            return Err(IngestError::upload_failed(e));
        }

        tracing::info!("☁️  Stored object {}/{}", self.bucket, key);
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<SignedUrl, IngestError> {
        if key.is_empty() {
            return Err(IngestError::SigningFailed("object key is empty".to_string()));
        }
        if ttl_secs == 0 {
            return Err(IngestError::SigningFailed(
                "signed URL lifetime must be positive".to_string(),
            ));
        }

        let presigning = PresigningConfig::expires_in(Duration::from_secs(ttl_secs))
            .map_err(|e| IngestError::SigningFailed(e.to_string()))?;

        let issued_at = Utc::now();
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| IngestError::SigningFailed(format!("{:?}", e)))?;

        let url = request.uri().to_string();
        if !has_signature(&url) {
            tracing::error!(
                "Presigned URL for '{}' carries no signature, credentials missing?",
                key
            );
            return Err(IngestError::SigningFailed(
                "no credentials available to sign the request".to_string(),
            ));
        }

        Ok(SignedUrl {
            url,
            expires_at: issued_at + chrono::Duration::seconds(ttl_secs as i64),
        })
    }

    async fn object_exists(&self, key: &str) -> Result<bool, IngestError> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    tracing::error!(
                        "S3 head_object failed: bucket={}, key={}, error={:?}",
                        self.bucket,
                        key,
                        service_error
                    );
                    Err(IngestError::object_store_unavailable(service_error))
                }
            }
        }
    }
}

/// Retries failed uploads a bounded number of times with a fixed pause.
/// Signing and existence checks pass straight through.
pub struct RetryingObjectStore {
    inner: Arc<dyn ObjectStore>,
    max_retries: u32,
    backoff: Duration,
}

impl RetryingObjectStore {
    pub fn new(inner: Arc<dyn ObjectStore>, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }
}

#[async_trait]
impl ObjectStore for RetryingObjectStore {
    async fn put_object(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), IngestError> {
        let mut attempt = 0;
        loop {
            match self.inner.put_object(local_path, key, content_type).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Upload of '{}' failed ({}), retry {}/{}",
                        key,
                        e,
                        attempt,
                        self.max_retries
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<SignedUrl, IngestError> {
        self.inner.signed_url(key, ttl_secs).await
    }

    async fn object_exists(&self, key: &str) -> Result<bool, IngestError> {
        self.inner.object_exists(key).await
    }
}
