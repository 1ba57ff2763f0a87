//! Tracking service coordinator.
//!
//! Ties the entity store, the connection registry and the message router
//! together. Operations are split across submodules by concern.

mod ingestion;
mod router;
mod snapshot;
pub mod state;

pub use ingestion::{DEFAULT_HISTORY_STATUS, parse_update};
pub use router::MessageRouter;
pub use snapshot::SnapshotTask;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::config::TrackingConfig;
use crate::db::{Database, TrackingUpdateRecord, run_blocking};
use crate::error::{ServiceError, ServiceResult};
use crate::websocket::ConnectionRegistry;

use state::EntityKind;

type EntityKey = (EntityKind, i64);

/// Main service coordinator
pub struct TrackingService {
    pub db: Arc<Database>,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<MessageRouter>,
    pub tracking: TrackingConfig,
    /// One FIFO lock per entity with an update in flight
    entity_locks: DashMap<EntityKey, Arc<Mutex<()>>>,
}

impl TrackingService {
    pub fn new(
        db: Arc<Database>,
        registry: Arc<ConnectionRegistry>,
        tracking: TrackingConfig,
    ) -> Self {
        info!(path = %tracking.path, "Initializing tracking service");

        let router = Arc::new(MessageRouter::new(registry.clone(), db.clone()));

        Self {
            db,
            registry,
            router,
            tracking,
            entity_locks: DashMap::new(),
        }
    }

    /// Most recent history for a load, newest first
    ///
    /// `limit` is capped at the configured maximum. Unknown loads are an error
    /// rather than an empty list.
    pub async fn recent_history(
        &self,
        load_id: i64,
        limit: Option<usize>,
    ) -> ServiceResult<Vec<TrackingUpdateRecord>> {
        let limit = self.tracking.history_limit(limit);

        run_blocking(&self.db, move |db| {
            if db.get_entity(EntityKind::Load, load_id)?.is_none() {
                return Err(ServiceError::EntityNotFound {
                    kind: EntityKind::Load.into(),
                    entity_id: load_id,
                });
            }
            db.recent_history(load_id, limit)
        })
        .await
    }

    fn entity_lock(&self, key: EntityKey) -> Arc<Mutex<()>> {
        self.entity_locks.entry(key).or_default().clone()
    }

    /// Drop the entity's lock once nobody else holds or waits on it
    fn release_entity_lock(&self, key: EntityKey) {
        self.entity_locks
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub(crate) fn pending_entity_locks(&self) -> usize {
        self.entity_locks.len()
    }
}
