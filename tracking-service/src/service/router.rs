//! Message router.
//!
//! Turns accepted updates into `load_update` envelopes and the current
//! carrier positions into `carrier_locations` snapshots.

use std::sync::Arc;
use tracing::debug;

use crate::db::{Database, run_blocking};
use crate::error::ServiceResult;
use crate::websocket::{
    BroadcastReport, CarrierLocation, ConnectionId, ConnectionRegistry, ServerMessage,
    TrackingUpdate,
};

pub struct MessageRouter {
    registry: Arc<ConnectionRegistry>,
    db: Arc<Database>,
}

impl MessageRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, db: Arc<Database>) -> Self {
        Self { registry, db }
    }

    /// Echo an accepted update to every connection except its sender
    pub fn route_update(&self, update: TrackingUpdate, sender: ConnectionId) -> BroadcastReport {
        let entity_id = update.entity_id;
        let report = self
            .registry
            .broadcast(&ServerMessage::from(update), Some(sender));

        debug!(
            entity_id,
            connection_id = %sender,
            delivered = report.delivered,
            "Routed tracking update"
        );

        report
    }

    /// Active carriers with a known position, ordered by id
    pub async fn carrier_locations(&self) -> ServiceResult<Vec<CarrierLocation>> {
        let carriers = run_blocking(&self.db, |db| db.list_active_carrier_positions()).await?;

        Ok(carriers
            .into_iter()
            .map(|carrier| CarrierLocation {
                id: carrier.id,
                location: carrier.position.as_pair(),
                name: carrier.name,
            })
            .collect())
    }

    pub async fn carrier_snapshot(&self) -> ServiceResult<ServerMessage> {
        Ok(ServerMessage::CarrierLocations {
            carriers: self.carrier_locations().await?,
        })
    }

    /// Send the carrier snapshot to every connection, senders included
    ///
    /// Nothing is queried while no one is connected.
    pub async fn broadcast_carrier_snapshot(&self) -> ServiceResult<BroadcastReport> {
        if self.registry.connection_count() == 0 {
            return Ok(BroadcastReport::default());
        }

        let snapshot = self.carrier_snapshot().await?;
        Ok(self.registry.broadcast(&snapshot, None))
    }
}
