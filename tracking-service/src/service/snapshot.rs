//! Periodic carrier snapshot task.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::MessageRouter;

/// Handle to the running snapshot broadcaster
///
/// A tick whose query fails is logged and skipped; it is never retried or
/// queued behind the next one.
pub struct SnapshotTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SnapshotTask {
    pub fn spawn(router: Arc<MessageRouter>, period: Duration) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            info!(period_secs = period.as_secs_f64(), "Carrier snapshot task started");

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match router.broadcast_carrier_snapshot().await {
                            Ok(report) => {
                                metrics::counter!("tracking_snapshots_total", "outcome" => "sent")
                                    .increment(1);
                                debug!(delivered = report.delivered, "Carrier snapshot tick");
                            }
                            Err(e) => {
                                metrics::counter!("tracking_snapshots_total", "outcome" => "skipped")
                                    .increment(1);
                                warn!(error = %e, "Carrier snapshot query failed, skipping tick");
                            }
                        }
                    }
                }
            }

            info!("Carrier snapshot task stopped");
        });

        Self { cancel, handle }
    }

    /// Cancel the task and wait for it to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Carrier snapshot task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::db::Database;
    use crate::websocket::ConnectionRegistry;

    #[tokio::test]
    async fn test_ticks_until_shutdown() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(MessageRouter::new(registry.clone(), db));

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(Uuid::new_v4(), None, tx);
        let _ = rx.recv().await;

        let task = SnapshotTask::spawn(router, Duration::from_millis(50));

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.as_str(), r#"{"type":"carrier_locations","carriers":[]}"#);

        tokio::time::timeout(Duration::from_secs(2), task.shutdown())
            .await
            .unwrap();

        // Drain anything sent before cancellation, then nothing more arrives
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_query_skips_tick_and_keeps_running() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let registry = Arc::new(ConnectionRegistry::new());
        let router = Arc::new(MessageRouter::new(registry.clone(), db.clone()));

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register(Uuid::new_v4(), None, tx);
        let _ = rx.recv().await;

        db.execute_batch("ALTER TABLE users RENAME TO users_offline;")
            .unwrap();
        let task = SnapshotTask::spawn(router, Duration::from_millis(30));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.try_recv().is_err());

        db.execute_batch("ALTER TABLE users_offline RENAME TO users;")
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.as_str(), r#"{"type":"carrier_locations","carriers":[]}"#);

        task.shutdown().await;
    }
}
