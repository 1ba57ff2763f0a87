//! Broadcast fan-out over the connection registry.

use tracing::{debug, warn};

use super::manager::{ConnectionId, ConnectionRegistry, ConnectionStatus, encode};
use super::messages::ServerMessage;

/// Delivery counts for one broadcast
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
}

impl ConnectionRegistry {
    /// Send a message to every open connection, optionally skipping one
    ///
    /// The message is serialized once. A connection whose channel is gone is
    /// marked closed and unregistered after the pass; it never stops delivery
    /// to the others.
    pub fn broadcast(&self, msg: &ServerMessage, exclude: Option<ConnectionId>) -> BroadcastReport {
        let Some(frame) = encode(msg) else {
            return BroadcastReport::default();
        };

        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        for entry in self.connections.iter() {
            if Some(*entry.key()) == exclude || entry.status != ConnectionStatus::Open {
                continue;
            }
            if entry.tx.send(frame.clone()).is_ok() {
                report.delivered += 1;
            } else {
                dead.push(*entry.key());
            }
        }

        for id in dead {
            warn!(connection_id = %id, "Dropping connection after failed broadcast send");
            self.set_status(id, ConnectionStatus::Closed);
            self.unregister(id);
            report.failed += 1;
        }

        if report.failed > 0 {
            metrics::counter!("tracking_broadcast_failures_total").increment(report.failed as u64);
        }
        if report.delivered > 0 {
            debug!(
                kind = msg.type_name(),
                delivered = report.delivered,
                "Broadcast message to connections"
            );
        }

        report
    }
}
