use crate::config::ObjectStoreConfig;
use crate::services::object_store::S3ObjectStore;
use aws_sdk_s3::config::{Credentials, Region};
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage(config: &ObjectStoreConfig) -> Arc<S3ObjectStore> {
    info!(
        "☁️  S3 Storage: {} (Bucket: {}, Region: {})",
        config.endpoint.as_deref().unwrap_or("aws"),
        config.bucket,
        config.region
    );

    let mut loader = aws_config::from_env().region(Region::new(config.region.clone()));
    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    match (&config.access_key, &config.secret_key) {
        (Some(access_key), Some(secret_key)) => {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "static",
            ));
        }
        _ => {
            tracing::warn!(
                "⚠️  S3_ACCESS_KEY / S3_SECRET_ACCESS_KEY not set, using the default credential chain"
            );
        }
    }
    let aws_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.force_path_style)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);

    // Ensure bucket exists
    match s3_client.head_bucket().bucket(&config.bucket).send().await {
        Ok(_) => info!("✅ Bucket '{}' is ready", config.bucket),
        Err(_) => {
            info!("🪣 Bucket '{}' not found, creating...", config.bucket);
            if let Err(e) = s3_client.create_bucket().bucket(&config.bucket).send().await {
                tracing::error!("❌ Failed to create bucket '{}': {}", config.bucket, e);
            } else {
                info!("✅ Bucket '{}' created successfully", config.bucket);
            }
        }
    }

    Arc::new(S3ObjectStore::new(s3_client, config.bucket.clone()))
}
