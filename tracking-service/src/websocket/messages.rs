//! WebSocket message types.
//!
//! Defines the inbound tracking update sent by vehicles and the tagged
//! envelopes the server sends to observers.

use serde::{Deserialize, Serialize};

use crate::service::state::EntityKind;

/// Location/status update sent by a tracked vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingUpdate {
    #[serde(alias = "loadId")]
    pub entity_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Defaults to a load when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EntityKind>,
}

impl TrackingUpdate {
    pub fn entity_kind(&self) -> EntityKind {
        self.kind.unwrap_or_default()
    }
}

/// One carrier in a `carrier_locations` snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierLocation {
    pub id: i64,
    pub location: [f64; 2],
    pub name: String,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every accepted connection
    ConnectionEstablished { timestamp: String },
    /// A tracking update accepted from another sender
    LoadUpdate { data: TrackingUpdate },
    /// Full snapshot of active carrier positions
    CarrierLocations { carriers: Vec<CarrierLocation> },
    /// Rejection of something this connection sent
    Error { error: String },
}

impl ServerMessage {
    /// `type` tags this version understands
    pub const KNOWN_TYPES: [&'static str; 4] = [
        "connection_established",
        "load_update",
        "carrier_locations",
        "error",
    ];

    pub fn type_name(&self) -> &'static str {
        match self {
            ServerMessage::ConnectionEstablished { .. } => "connection_established",
            ServerMessage::LoadUpdate { .. } => "load_update",
            ServerMessage::CarrierLocations { .. } => "carrier_locations",
            ServerMessage::Error { .. } => "error",
        }
    }
}

impl From<TrackingUpdate> for ServerMessage {
    fn from(update: TrackingUpdate) -> Self {
        ServerMessage::LoadUpdate { data: update }
    }
}
