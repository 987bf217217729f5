use crate::services::metadata_store::MetadataStore;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Periodically purges records stuck in `pending`: ingests whose process
/// died or whose compensation could not reach the database.
pub struct Reconciler {
    store: MetadataStore,
    interval: Duration,
    grace: chrono::Duration,
    shutdown: watch::Receiver<bool>,
}

impl Reconciler {
    pub fn new(
        store: MetadataStore,
        interval: Duration,
        grace: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            // Zero would spin the sweep loop
            interval: interval.max(Duration::from_secs(1)),
            grace: chrono::Duration::from_std(grace)
                .unwrap_or_else(|_| chrono::Duration::days(36500)),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Reconciler started (every {:?})", self.interval);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Reconciler shutting down");
                    break;
                }
                _ = sleep(self.interval) => {
                    self.sweep().await;
                }
            }
        }
    }

    /// One pass over abandoned pending records. Returns how many were purged.
    pub async fn sweep(&self) -> u64 {
        let Some(cutoff) = Utc::now().checked_sub_signed(self.grace) else {
            return 0;
        };
        match self.store.purge_stale_pending(cutoff).await {
            Ok(0) => {
                tracing::debug!("🧹 No abandoned pending records");
                0
            }
            Ok(n) => {
                tracing::info!("🧹 Purged {} abandoned pending record(s)", n);
                n
            }
            Err(e) => {
                tracing::error!("Reconciler sweep failed: {}", e);
                0
            }
        }
    }
}
