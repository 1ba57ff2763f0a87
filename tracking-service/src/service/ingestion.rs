//! Inbound tracking update ingestion.

use tracing::{debug, warn};

use super::TrackingService;
use super::state::Position;
use crate::db::{AppliedUpdate, PositionWrite, run_blocking};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::websocket::{ConnectionId, ServerMessage, TrackingUpdate};

/// History status recorded when an update carries none
pub const DEFAULT_HISTORY_STATUS: &str = "location_update";

/// Parse and validate one raw inbound message
///
/// Returns the update as it will be echoed to observers together with the
/// write it implies. A blank status counts as no status.
pub fn parse_update(raw: &str) -> Result<(TrackingUpdate, PositionWrite), ValidationError> {
    let update: TrackingUpdate = serde_json::from_str(raw).map_err(ValidationError::Malformed)?;

    if update.entity_id <= 0 {
        return Err(ValidationError::EntityId(update.entity_id));
    }

    let position = Position::new(update.latitude, update.longitude)?;
    let kind = update.entity_kind();
    let status = update
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let write = PositionWrite {
        kind,
        entity_id: update.entity_id,
        position,
        entity_status: status.and_then(|s| kind.lifecycle_status(s)),
        history_status: status.unwrap_or(DEFAULT_HISTORY_STATUS).to_string(),
        message: update.message.clone(),
    };

    Ok((update, write))
}

impl TrackingService {
    /// Ingest one raw message received from `sender`
    ///
    /// On success the position and history are committed and the update is
    /// routed to every other connection. On failure the sender alone gets an
    /// `error` envelope and its connection stays open.
    pub async fn ingest(&self, sender: ConnectionId, raw: &str) -> ServiceResult<AppliedUpdate> {
        let result = self.apply_update(sender, raw).await;

        match &result {
            Ok(applied) => {
                metrics::counter!("tracking_updates_total", "outcome" => "accepted").increment(1);
                debug!(
                    connection_id = %sender,
                    updated_at = %applied.updated_at,
                    "Tracking update applied"
                );
            }
            Err(e) => {
                let outcome = match e {
                    ServiceError::Validation(_) | ServiceError::EntityNotFound { .. } => "rejected",
                    _ => "failed",
                };
                metrics::counter!("tracking_updates_total", "outcome" => outcome).increment(1);
                warn!(connection_id = %sender, error = %e, outcome, "Tracking update not applied");

                self.registry.send_to(
                    sender,
                    &ServerMessage::Error {
                        error: e.sender_message(),
                    },
                );
            }
        }

        result
    }

    async fn apply_update(&self, sender: ConnectionId, raw: &str) -> ServiceResult<AppliedUpdate> {
        let (update, write) = parse_update(raw)?;
        let key = (write.kind, write.entity_id);

        // Held through persist and broadcast so same-entity updates from
        // different senders are applied and echoed in receipt order.
        let lock = self.entity_lock(key);
        let guard = lock.lock().await;

        let result = match run_blocking(&self.db, move |db| db.apply_position_write(&write)).await
        {
            Ok(applied) => {
                self.router.route_update(update, sender);
                Ok(applied)
            }
            Err(e) => Err(e),
        };

        drop(guard);
        drop(lock);
        self.release_entity_lock(key);

        result
    }
}
