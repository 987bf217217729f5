mod common;

use chrono::Utc;
use common::{MockObjectStore, setup_test_db, staged_entries};
use ingest_gateway::entities::{file_records, prelude::*};
use ingest_gateway::models::RecordStatus;
use ingest_gateway::services::error::IngestError;
use ingest_gateway::services::ingest::IngestPipeline;
use ingest_gateway::services::metadata_store::MetadataStore;
use ingest_gateway::services::reconciler::Reconciler;
use ingest_gateway::services::retrieval::RetrievalResolver;
use ingest_gateway::services::staging::TempStage;
use sea_orm::{ActiveModelTrait, ConnectionTrait, EntityTrait, Set};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    store: MetadataStore,
    objects: Arc<MockObjectStore>,
    stage: TempStage,
    pipeline: IngestPipeline,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    common::init_tracing();
    let db = setup_test_db().await;
    let store = MetadataStore::new(db);
    let objects = Arc::new(MockObjectStore::new());
    let dir = tempfile::tempdir().unwrap();
    let stage = TempStage::new(dir.path(), 1024 * 1024);
    let pipeline = IngestPipeline::new(store.clone(), objects.clone());

    Harness {
        store,
        objects,
        stage,
        pipeline,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_successful_ingest_commits_record_and_object() {
    let h = harness().await;

    let staged = h
        .stage
        .stage("report.pdf", Some("application/pdf"), &b"%PDF-1.7 quarterly"[..])
        .await
        .unwrap();
    let staged_path = staged.path().to_path_buf();

    let record = h.pipeline.ingest(staged).await.unwrap();

    assert_eq!(record.name, "report.pdf");
    assert_eq!(record.storage_key, "report.pdf");
    assert_eq!(record.size, 18);
    assert_eq!(record.content_type.as_deref(), Some("application/pdf"));

    let (data, content_type) = h.objects.object("report.pdf").unwrap();
    assert_eq!(data, b"%PDF-1.7 quarterly");
    assert_eq!(content_type, "application/pdf");

    // Uploaded from the staged copy, which is gone now
    assert_eq!(h.objects.upload_sources(), vec![staged_path.clone()]);
    assert!(!staged_path.exists());
    assert_eq!(staged_entries(h.stage.dir()), 0);

    let listed = h.store.list_all().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, record.id);

    let row = FileRecords::find_by_id(record.id)
        .one(h.store.connection())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, RecordStatus::Committed.as_str());
}

#[tokio::test]
async fn test_failed_upload_leaves_no_record_and_no_temp_file() {
    let h = harness().await;
    h.objects.fail_uploads(true);

    let staged = h
        .stage
        .stage("broken.txt", Some("text/plain"), &b"will not make it"[..])
        .await
        .unwrap();
    let staged_path = staged.path().to_path_buf();

    let err = h.pipeline.ingest(staged).await.unwrap_err();

    assert!(matches!(err, IngestError::UploadFailed { .. }));
    assert!(!staged_path.exists());
    assert_eq!(staged_entries(h.stage.dir()), 0);
    assert!(!h.objects.contains("broken.txt"));

    // Compensation removed the pending row entirely
    let rows = FileRecords::find().all(h.store.connection()).await.unwrap();
    assert!(rows.is_empty());
    assert!(h.store.list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_metadata_outage_aborts_before_upload() {
    let h = harness().await;
    h.store
        .connection()
        .execute_unprepared("DROP TABLE file_records")
        .await
        .unwrap();

    let staged = h
        .stage
        .stage("report.pdf", None, &b"data"[..])
        .await
        .unwrap();
    let staged_path = staged.path().to_path_buf();

    let err = h.pipeline.ingest(staged).await.unwrap_err();

    assert!(matches!(err, IngestError::StoreUnavailable(_)));
    assert!(h.objects.upload_sources().is_empty());
    assert_eq!(h.objects.len(), 0);
    assert!(!staged_path.exists());
}

#[tokio::test]
async fn test_record_purged_mid_upload_is_reported_as_store_failure() {
    let h = harness().await;
    h.objects.run_sql_during_upload(
        h.store.connection().clone(),
        "DELETE FROM file_records",
    );

    let staged = h
        .stage
        .stage("race.txt", None, &b"data"[..])
        .await
        .unwrap();

    let err = h.pipeline.ingest(staged).await.unwrap_err();

    assert!(matches!(err, IngestError::StoreUnavailable(_)));
    // The object made it, but no record claims it
    assert!(h.objects.contains("race.txt"));
    assert!(h.store.list_all().await.unwrap().is_empty());
    assert_eq!(staged_entries(h.stage.dir()), 0);
}

#[tokio::test]
async fn test_pending_records_are_invisible_to_readers() {
    let h = harness().await;
    let pending = h
        .store
        .create_pending("half.bin", "half.bin", None, 4)
        .await
        .unwrap();

    assert!(h.store.list_all().await.unwrap().is_empty());
    assert!(matches!(
        h.store.find_by_id(pending.id).await,
        Err(IngestError::RecordNotFound(id)) if id == pending.id
    ));
}

#[tokio::test]
async fn test_listing_preserves_insertion_order() {
    let h = harness().await;

    for name in ["b.txt", "a.txt", "c.txt"] {
        let staged = h.stage.stage(name, None, name.as_bytes()).await.unwrap();
        h.pipeline.ingest(staged).await.unwrap();
    }

    let names: Vec<String> = h
        .store
        .list_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(names, vec!["b.txt", "a.txt", "c.txt"]);
}

#[tokio::test]
async fn test_resolve_signs_committed_record() {
    let h = harness().await;
    let staged = h
        .stage
        .stage("report.pdf", None, &b"pdf"[..])
        .await
        .unwrap();
    let record = h.pipeline.ingest(staged).await.unwrap();

    let resolver = RetrievalResolver::new(h.store.clone(), h.objects.clone(), 10, true);
    let before = Utc::now();
    let signed = resolver.resolve(record.id).await.unwrap();

    assert!(signed.url.contains("/mock-bucket/report.pdf"));
    assert!(signed.url.contains("X-Amz-Expires=10"));
    assert!(signed.expires_at > before);
    assert!(signed.expires_at <= Utc::now() + chrono::Duration::seconds(10));
}

#[tokio::test]
async fn test_resolve_unknown_id_is_not_found() {
    let h = harness().await;
    let resolver = RetrievalResolver::new(h.store.clone(), h.objects.clone(), 10, true);

    assert!(matches!(
        resolver.resolve(999999).await,
        Err(IngestError::RecordNotFound(999999))
    ));
}

#[tokio::test]
async fn test_resolve_dangling_record() {
    let h = harness().await;
    let staged = h
        .stage
        .stage("gone.txt", None, &b"bye"[..])
        .await
        .unwrap();
    let record = h.pipeline.ingest(staged).await.unwrap();
    h.objects.remove("gone.txt");

    let verifying = RetrievalResolver::new(h.store.clone(), h.objects.clone(), 10, true);
    assert!(matches!(
        verifying.resolve(record.id).await,
        Err(IngestError::ObjectMissing { key }) if key == "gone.txt"
    ));

    // Without the HEAD check the URL is still produced; following it would 404
    let trusting = RetrievalResolver::new(h.store.clone(), h.objects.clone(), 10, false);
    let signed = trusting.resolve(record.id).await.unwrap();
    assert!(signed.url.contains("gone.txt"));
}

#[tokio::test]
async fn test_reconciler_purges_only_stale_pending_records() {
    let h = harness().await;

    let staged = h.stage.stage("kept.txt", None, &b"k"[..]).await.unwrap();
    let committed = h.pipeline.ingest(staged).await.unwrap();

    let stale = file_records::ActiveModel {
        name: Set("stale.txt".to_string()),
        storage_key: Set("stale.txt".to_string()),
        content_type: Set(None),
        size: Set(1),
        status: Set(RecordStatus::Pending.as_str().to_string()),
        created_at: Set(Utc::now() - chrono::Duration::hours(2)),
        updated_at: Set(Utc::now() - chrono::Duration::hours(2)),
        ..Default::default()
    }
    .insert(h.store.connection())
    .await
    .unwrap();
    let fresh = h
        .store
        .create_pending("fresh.txt", "fresh.txt", None, 1)
        .await
        .unwrap();

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let reconciler = Reconciler::new(
        h.store.clone(),
        Duration::from_secs(60),
        Duration::from_secs(3600),
        rx,
    );

    assert_eq!(reconciler.sweep().await, 1);

    let remaining: Vec<i32> = FileRecords::find()
        .all(h.store.connection())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert!(remaining.contains(&committed.id));
    assert!(remaining.contains(&fresh.id));
    assert!(!remaining.contains(&stale.id));
}

#[tokio::test]
async fn test_reconciler_stops_on_shutdown() {
    let h = harness().await;
    let (tx, rx) = tokio::sync::watch::channel(false);
    let reconciler = Reconciler::new(
        h.store.clone(),
        Duration::from_secs(3600),
        Duration::from_secs(60),
        rx,
    );

    let handle = tokio::spawn(reconciler.run());
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("reconciler did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_release_failure_does_not_mask_a_successful_ingest() {
    let h = harness().await;
    h.objects.remove_source_after_upload(true);

    let staged = h
        .stage
        .stage("vanishing.txt", None, &b"here, then gone"[..])
        .await
        .unwrap();

    let record = h.pipeline.ingest(staged).await.unwrap();

    assert_eq!(record.name, "vanishing.txt");
    assert!(h.objects.contains("vanishing.txt"));
    assert_eq!(h.store.list_all().await.unwrap().len(), 1);
    assert_eq!(staged_entries(h.stage.dir()), 0);
}

#[tokio::test]
async fn test_resolve_reports_unreachable_object_storage() {
    let h = harness().await;
    let staged = h
        .stage
        .stage("report.pdf", None, &b"pdf"[..])
        .await
        .unwrap();
    let record = h.pipeline.ingest(staged).await.unwrap();
    h.objects.fail_head(true);

    let resolver = RetrievalResolver::new(h.store.clone(), h.objects.clone(), 10, true);
    assert!(matches!(
        resolver.resolve(record.id).await,
        Err(IngestError::ObjectStoreUnavailable { .. })
    ));
}
