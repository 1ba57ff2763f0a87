//! Client connection manager for the tracking channel.
//!
//! Keeps one logical connection per session alive across transport drops,
//! with capped exponential backoff between attempts, and dispatches inbound
//! envelopes by their `type`.

mod backoff;
mod connection;
mod dispatch;
mod state;
mod view;

pub use backoff::ReconnectPolicy;
pub use connection::ConnectionManager;
pub use dispatch::{Dispatched, MessageHandler, dispatch};
pub use state::{ConnectionPhase, ConnectionStateMachine};
pub use view::{TrackingView, ViewSnapshot};
