use clap::Parser;
use dotenvy::dotenv;
use ingest_gateway::config::GatewayConfig;
use ingest_gateway::infrastructure::{database, storage};
use ingest_gateway::services::metadata_store::MetadataStore;
use ingest_gateway::services::object_store::{ObjectStore, RetryingObjectStore};
use ingest_gateway::services::reconciler::Reconciler;
use ingest_gateway::{AppState, create_app};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the HTTP server (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ingest_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Ingest Gateway...");

    // 2. Resolve configuration once
    let mut config = GatewayConfig::from_env();
    if let Some(port) = args.port {
        config.listen_port = port;
    }
    info!(
        "🛡️  Config: Max Size={}MB, Signed URL TTL={}s, Upload Retries={}, Staging={}",
        config.max_file_size / 1024 / 1024,
        config.signed_url_ttl_secs,
        config.upload_max_retries,
        config.staging_dir.display()
    );

    // 3. Infrastructure
    let db = database::setup_database(&config.database).await?;
    let s3: Arc<dyn ObjectStore> = storage::setup_storage(&config.object_store).await;
    let objects: Arc<dyn ObjectStore> = if config.upload_max_retries > 0 {
        Arc::new(RetryingObjectStore::new(
            s3,
            config.upload_max_retries,
            Duration::from_millis(500),
        ))
    } else {
        s3
    };
    let store = MetadataStore::new(db);

    // 4. Shutdown channel & reconciler
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let reconciler = Reconciler::new(
        store.clone(),
        Duration::from_secs(config.reconcile_interval_secs),
        Duration::from_secs(config.pending_grace_secs),
        shutdown_rx,
    );
    let reconciler_handle = tokio::spawn(reconciler.run());

    // 5. HTTP server
    let port = config.listen_port;
    let state = AppState::new(config, store, objects);

    let app = create_app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ Listening on: http://0.0.0.0:{}", port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", port);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    info!("🛑 Shutting down background tasks...");
    let _ = shutdown_tx.send(true);
    let _ = reconciler_handle.await;

    info!("👋 Gateway exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
