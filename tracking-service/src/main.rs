use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

use tracking_service::api;
use tracking_service::config::load_static_config;
use tracking_service::db::Database;
use tracking_service::service::{SnapshotTask, TrackingService};
use tracking_service::websocket::ConnectionRegistry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracking_service::init_logging();

    info!(
        "Starting tracking service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let static_config = load_static_config()?;

    info!(
        host = %static_config.server.host,
        port = static_config.server.port,
        path = %static_config.tracking.path,
        "Static configuration loaded"
    );

    // Ensure data directory exists
    std::fs::create_dir_all(&static_config.storage.data_dir)?;

    // Initialize database
    let db_path = static_config.storage.data_dir.join("tracking.db");
    let db = Arc::new(Database::open(&db_path)?);
    info!(path = %db_path.display(), "Database initialized");

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
            None
        }
    };

    // The registry lives for the whole server run
    let registry = Arc::new(ConnectionRegistry::new());
    let service = Arc::new(TrackingService::new(
        db,
        registry,
        static_config.tracking.clone(),
    ));

    let snapshot = SnapshotTask::spawn(
        service.router.clone(),
        static_config.tracking.snapshot_interval(),
    );

    let app = api::router(service.clone(), metrics);

    // Start the server
    let addr = format!(
        "{}:{}",
        static_config.server.host, static_config.server.port
    );
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    snapshot.shutdown().await;
    info!(
        open_connections = service.registry.connection_count(),
        "Tracking service stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
