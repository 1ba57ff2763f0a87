//! Inbound envelope dispatch.

use serde_json::Value;
use tracing::debug;

use super::ConnectionPhase;
use crate::websocket::{CarrierLocation, ServerMessage, TrackingUpdate};

/// Receiver of connection events and inbound envelopes
///
/// Each envelope goes to exactly one method, chosen by its `type`.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_phase_change(&self, _phase: ConnectionPhase) {}

    fn on_connection_established(&self, _timestamp: &str) {}

    fn on_load_update(&self, _update: &TrackingUpdate) {}

    fn on_carrier_locations(&self, _carriers: &[CarrierLocation]) {}

    fn on_error(&self, _error: &str) {}

    /// A frame that could not be decoded as an envelope
    fn on_invalid_message(&self, _error: &serde_json::Error) {}
}

/// What [`dispatch`] did with a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Handled(&'static str),
    UnknownType(String),
    Invalid,
}

pub fn dispatch(handler: &dyn MessageHandler, text: &str) -> Dispatched {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            handler.on_invalid_message(&e);
            return Dispatched::Invalid;
        }
    };

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if !ServerMessage::KNOWN_TYPES.contains(&kind.as_str()) {
        debug!(kind = %kind, "Ignoring message of unknown type");
        return Dispatched::UnknownType(kind);
    }

    let msg: ServerMessage = match serde_json::from_value(value) {
        Ok(msg) => msg,
        Err(e) => {
            handler.on_invalid_message(&e);
            return Dispatched::Invalid;
        }
    };

    match &msg {
        ServerMessage::ConnectionEstablished { timestamp } => {
            handler.on_connection_established(timestamp)
        }
        ServerMessage::LoadUpdate { data } => handler.on_load_update(data),
        ServerMessage::CarrierLocations { carriers } => handler.on_carrier_locations(carriers),
        ServerMessage::Error { error } => handler.on_error(error),
    }

    Dispatched::Handled(msg.type_name())
}
