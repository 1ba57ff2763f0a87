//! WebSocket tracking channel.
//!
//! Vehicles send location updates over the same connection observers use to
//! receive `load_update` echoes and periodic `carrier_locations` snapshots.

mod broadcast;
mod handlers;
pub mod manager;
pub mod messages;

pub use broadcast::BroadcastReport;
pub use handlers::handle_ws_connection;
pub use manager::{ConnectionId, ConnectionRegistry, ConnectionStatus, OutboundFrame};
pub use messages::{CarrierLocation, ServerMessage, TrackingUpdate};
