#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use ingest_gateway::config::{DatabaseConfig, GatewayConfig};
use ingest_gateway::infrastructure::database;
use ingest_gateway::models::SignedUrl;
use ingest_gateway::services::error::IngestError;
use ingest_gateway::services::object_store::ObjectStore;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const BUCKET: &str = "mock-bucket";

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("ingest_gateway=debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

pub async fn setup_test_db() -> DatabaseConnection {
    let config = DatabaseConfig {
        url: Some("sqlite::memory:".to_string()),
        ..GatewayConfig::default().database
    };
    database::setup_database(&config).await.unwrap()
}

pub fn staged_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

/// In-memory bucket with switchable failures
pub struct MockObjectStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    uploaded_from: Mutex<Vec<PathBuf>>,
    fail_uploads: AtomicBool,
    fail_head: AtomicBool,
    /// Deletes the local source once its bytes are in the bucket
    remove_source_after_upload: AtomicBool,
    /// Uploads wait here until notified
    upload_gate: Mutex<Option<Arc<Notify>>>,
    /// Runs against the database while an upload is in flight
    sql_during_upload: Mutex<Option<(DatabaseConnection, String)>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            uploaded_from: Mutex::new(Vec::new()),
            fail_uploads: AtomicBool::new(false),
            fail_head: AtomicBool::new(false),
            remove_source_after_upload: AtomicBool::new(false),
            upload_gate: Mutex::new(None),
            sql_during_upload: Mutex::new(None),
        }
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_head(&self, fail: bool) {
        self.fail_head.store(fail, Ordering::SeqCst);
    }

    pub fn remove_source_after_upload(&self, remove: bool) {
        self.remove_source_after_upload.store(remove, Ordering::SeqCst);
    }

    /// Hold every upload until the returned handle is notified.
    pub fn gate_uploads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.upload_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn run_sql_during_upload(&self, db: DatabaseConnection, sql: &str) {
        *self.sql_during_upload.lock().unwrap() = Some((db, sql.to_string()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn object(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn remove(&self, key: &str) {
        self.objects.lock().unwrap().remove(key);
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn upload_sources(&self) -> Vec<PathBuf> {
        self.uploaded_from.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn put_object(
        &self,
        local_path: &Path,
        key: &str,
        content_type: &str,
    ) -> Result<(), IngestError> {
        self.uploaded_from
            .lock()
            .unwrap()
            .push(local_path.to_path_buf());

        let hook = self.sql_during_upload.lock().unwrap().take();
        if let Some((db, sql)) = hook {
            db.execute_unprepared(&sql).await.unwrap();
        }

        let gate = self.upload_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(IngestError::upload_failed(anyhow::anyhow!(
                "simulated object storage outage"
            )));
        }

        let data = tokio::fs::read(local_path)
            .await
            .map_err(IngestError::upload_failed)?;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));

        if self.remove_source_after_upload.load(Ordering::SeqCst) {
            std::fs::remove_file(local_path).unwrap();
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl_secs: u64) -> Result<SignedUrl, IngestError> {
        if key.is_empty() {
            return Err(IngestError::SigningFailed("object key is empty".to_string()));
        }
        Ok(SignedUrl {
            url: format!(
                "http://mock-s3.local/{}/{}?X-Amz-Expires={}&X-Amz-Signature=mock",
                BUCKET, key, ttl_secs
            ),
            expires_at: Utc::now() + chrono::Duration::seconds(ttl_secs as i64),
        })
    }

    async fn object_exists(&self, key: &str) -> Result<bool, IngestError> {
        if self.fail_head.load(Ordering::SeqCst) {
            return Err(IngestError::object_store_unavailable(anyhow::anyhow!(
                "simulated 403 on HEAD"
            )));
        }
        Ok(self.contains(key))
    }
}
