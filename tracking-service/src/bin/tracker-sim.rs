//! Simulated tracker.
//!
//! Connects to the tracking channel through the client connection manager
//! and reports positions interpolated between two points, one per interval.

use std::sync::Arc;

use tracing::{info, warn};

use tracking_service::client::{ConnectionManager, TrackingView};
use tracking_service::config::{SimulatorConfig, load_static_config};
use tracking_service::error::ClientError;
use tracking_service::websocket::TrackingUpdate;

/// Position `step` of `steps` on the straight line from start to end
fn waypoint(sim: &SimulatorConfig, step: u32) -> (f64, f64) {
    let t = if sim.steps <= 1 {
        1.0
    } else {
        f64::from(step) / f64::from(sim.steps - 1)
    };
    let [start_lat, start_lng] = sim.start;
    let [end_lat, end_lng] = sim.end;
    (
        start_lat + (end_lat - start_lat) * t,
        start_lng + (end_lng - start_lng) * t,
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracking_service::init_logging();

    let config = load_static_config()?;
    let sim = config.simulator;

    let view = Arc::new(TrackingView::new());
    let manager = ConnectionManager::connect(
        config.client.url.clone(),
        config.client.reconnect_policy(),
        view.clone(),
    );

    manager.wait_connected().await?;
    info!(url = %config.client.url, entity_id = sim.entity_id, kind = %sim.kind, "Simulated tracker connected");

    let mut ticker = tokio::time::interval(sim.interval());
    for step in 0..sim.steps {
        ticker.tick().await;

        let (latitude, longitude) = waypoint(&sim, step);
        let update = TrackingUpdate {
            entity_id: sim.entity_id,
            latitude,
            longitude,
            status: sim.status.clone(),
            message: None,
            kind: Some(sim.kind),
        };

        match manager.send(&update) {
            Ok(()) => info!(step, latitude, longitude, "Sent position"),
            Err(ClientError::NotConnected) => {
                warn!(step, "Not connected, position dropped");
                if manager.phase().is_terminal() {
                    break;
                }
            }
            Err(e) => warn!(step, error = %e, "Failed to send position"),
        }

        if let Some(error) = view.snapshot().last_error {
            warn!(error = %error, "Server reported a problem");
        }
    }

    manager.close().await;
    Ok(())
}
