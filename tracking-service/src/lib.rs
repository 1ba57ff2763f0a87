//! Real-time location tracking and broadcast core for a freight marketplace.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod service;
pub mod websocket;

/// Install the process-wide tracing subscriber
///
/// Honours `RUST_LOG`; defaults to info for this crate.
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("tracking_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
