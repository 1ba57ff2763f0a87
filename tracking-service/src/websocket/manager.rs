//! Connection registry.
//!
//! Owns the set of live observer connections. Each entry holds the sending
//! half of the channel drained by that connection's writer task.

use std::net::SocketAddr;

use axum::extract::ws::Utf8Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::messages::ServerMessage;

/// Opaque per-socket identifier
pub type ConnectionId = Uuid;

/// Serialized frame queued for a connection's writer task
pub type OutboundFrame = Utf8Bytes;

/// Lifecycle of a server-side connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// State for a single WebSocket connection
pub(crate) struct ConnectionState {
    pub(crate) remote_addr: Option<SocketAddr>,
    pub(crate) opened_at: DateTime<Utc>,
    pub(crate) status: ConnectionStatus,
    pub(crate) tx: mpsc::UnboundedSender<OutboundFrame>,
}

/// Registry of all live tracking connections
///
/// Created once at startup and shared by the connection handlers and the
/// message router.
pub struct ConnectionRegistry {
    pub(crate) connections: DashMap<ConnectionId, ConnectionState>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn encode(msg: &ServerMessage) -> Option<OutboundFrame> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Utf8Bytes::from(json)),
        Err(e) => {
            error!(error = %e, kind = msg.type_name(), "Failed to serialize WebSocket message");
            None
        }
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Add an open connection and greet it with `connection_established`
    pub fn register(
        &self,
        id: ConnectionId,
        remote_addr: Option<SocketAddr>,
        tx: mpsc::UnboundedSender<OutboundFrame>,
    ) {
        let opened_at = Utc::now();
        debug!(connection_id = %id, remote_addr = ?remote_addr, "Adding WebSocket connection");

        self.connections.insert(
            id,
            ConnectionState {
                remote_addr,
                opened_at,
                status: ConnectionStatus::Open,
                tx,
            },
        );
        self.record_gauge();

        self.send_to(
            id,
            &ServerMessage::ConnectionEstablished {
                timestamp: opened_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            },
        );
    }

    /// Remove a connection. Returns false when it was not registered.
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = self.connections.remove(&id);
        if let Some((_, state)) = &removed {
            debug!(
                connection_id = %id,
                remote_addr = ?state.remote_addr,
                open_for_secs = (Utc::now() - state.opened_at).num_seconds(),
                "Removing WebSocket connection"
            );
            self.record_gauge();
        }
        removed.is_some()
    }

    pub fn set_status(&self, id: ConnectionId, status: ConnectionStatus) {
        if let Some(mut conn) = self.connections.get_mut(&id) {
            conn.status = status;
        }
    }

    pub fn status(&self, id: ConnectionId) -> Option<ConnectionStatus> {
        self.connections.get(&id).map(|conn| conn.status)
    }

    /// Send a message to a specific connection
    pub fn send_to(&self, id: ConnectionId, msg: &ServerMessage) -> bool {
        let Some(frame) = encode(msg) else {
            return false;
        };

        let Some(conn) = self.connections.get(&id) else {
            return false;
        };
        if conn.status != ConnectionStatus::Open {
            return false;
        }

        if conn.tx.send(frame).is_err() {
            warn!(connection_id = %id, "Failed to send message to connection");
            return false;
        }
        true
    }

    /// Ids of every registered connection
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    /// Get the number of registered connections
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn record_gauge(&self) {
        metrics::gauge!("tracking_connections").set(self.connections.len() as f64);
    }
}
