//! Background Expiry Sweeper
//!
//! Lazy expiry (checking on access) leaves one gap: a key that expires and is
//! never read again stays in the backend forever. The sweeper closes it by
//! periodically asking the active backend to purge expired entries.
//!
//! The sweeper is owned by the engine instance, never a process-wide
//! singleton: started on connect for backends that want one, stopped on
//! disconnect. Stopping goes through a watch channel so the task exits
//! between sweeps and no timer survives engine teardown. Each sweep is a
//! single backend call; the task holds no lock of its own across it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::StorageBackend;

/// A handle to the running expiry sweeper.
///
/// Dropping the handle stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    shutdown_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Start sweeping `backend` every `interval`.
    pub fn start(backend: Arc<dyn StorageBackend>, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tokio::spawn(sweeper_loop(backend, interval, shutdown_rx));
        info!(interval_secs = interval.as_secs(), "expiry sweeper started");

        Self { shutdown_tx }
    }

    /// Stop the sweeper. Also called when the handle is dropped.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("expiry sweeper stopped");
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweeper_loop(
    backend: Arc<dyn StorageBackend>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("expiry sweeper received shutdown signal");
                    return;
                }
            }
        }

        match backend.purge_expired().await {
            Ok(purged) if purged > 0 => {
                debug!(purged, backend = backend.name(), "expired entries purged");
            }
            Ok(_) => {}
            // A failed sweep is retried on the next tick; purging is
            // idempotent.
            Err(err) => {
                warn!(error = %err, backend = backend.name(), "expiry sweep failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryBackend;
    use serde_json::json;

    #[tokio::test]
    async fn test_sweeper_purges_expired_keys() {
        let backend = Arc::new(MemoryBackend::new());

        for i in 0..10 {
            backend
                .set(&format!("key{i}"), &json!("value"), Some(0))
                .await
                .unwrap();
        }
        backend.set("persistent", &json!("value"), None).await.unwrap();

        let _sweeper = ExpirySweeper::start(backend.clone(), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(backend.keys("*").await.unwrap(), vec!["persistent"]);
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_drop() {
        let backend = Arc::new(MemoryBackend::new());

        {
            let _sweeper = ExpirySweeper::start(backend.clone(), Duration::from_millis(10));
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        // With the sweeper gone the entry stays until read lazily.
        backend.set("key", &json!("v"), Some(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(backend.get("key").await.unwrap(), None);
    }
}
