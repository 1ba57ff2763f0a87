//! Static configuration loaded once at startup.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::ReconnectPolicy;
use crate::error::{ServiceError, ServiceResult};
use crate::service::state::EntityKind;

/// Static configuration that cannot be changed at runtime
#[derive(Debug, Clone, Deserialize)]
pub struct StaticConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_tracking")]
    pub tracking: TrackingConfig,

    #[serde(default = "default_client")]
    pub client: ClientConfig,

    #[serde(default = "default_simulator")]
    pub simulator: SimulatorConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Tracking channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Path of the WebSocket upgrade endpoint
    #[serde(default = "default_tracking_path")]
    pub path: String,

    #[serde(default = "default_snapshot_interval_secs")]
    pub snapshot_interval_secs: u64,

    /// Origins allowed to open the tracking channel. Empty allows any origin.
    /// Entries starting with `*.` match any subdomain.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_history_default_limit")]
    pub history_default_limit: usize,

    #[serde(default = "default_history_max_limit")]
    pub history_max_limit: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        default_tracking()
    }
}

impl TrackingConfig {
    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }

    /// Check an upgrade request's `Origin` header against the allow-list
    pub fn origin_allowed(&self, origin: &str) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }

        let host = origin
            .split_once("://")
            .map_or(origin, |(_, rest)| rest)
            .split(':')
            .next()
            .unwrap_or_default();

        self.allowed_origins.iter().any(|allowed| {
            if let Some(suffix) = allowed.strip_prefix("*.") {
                host.len() > suffix.len()
                    && host.ends_with(suffix)
                    && host[..host.len() - suffix.len()].ends_with('.')
            } else if allowed.contains("://") {
                allowed == origin
            } else {
                allowed == host
            }
        })
    }

    /// Cap a requested history size at the configured maximum
    ///
    /// An explicit zero stays zero.
    pub fn history_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.history_default_limit)
            .min(self.history_max_limit)
    }
}

/// Consumer-side connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_url")]
    pub url: String,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_grow_factor")]
    pub grow_factor: f64,

    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        default_client()
    }
}

impl ClientConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_retries: self.max_retries,
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            grow_factor: self.grow_factor,
            connection_timeout: Duration::from_millis(self.connection_timeout_ms),
        }
    }
}

/// Simulated tracker settings
#[derive(Debug, Clone, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default = "default_sim_entity_id")]
    pub entity_id: i64,

    #[serde(default)]
    pub kind: EntityKind,

    #[serde(default = "default_sim_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_sim_steps")]
    pub steps: u32,

    #[serde(default = "default_sim_start")]
    pub start: [f64; 2],

    #[serde(default = "default_sim_end")]
    pub end: [f64; 2],

    #[serde(default)]
    pub status: Option<String>,
}

impl SimulatorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl StaticConfig {
    /// Reject settings the service cannot run with
    pub fn validate(&self) -> ServiceResult<()> {
        let fail = |message: &str| -> ServiceResult<()> {
            Err(ServiceError::Config {
                message: message.to_string(),
            })
        };

        if !self.tracking.path.starts_with('/') {
            return fail("tracking.path must start with '/'");
        }
        if self.tracking.snapshot_interval_secs == 0 {
            return fail("tracking.snapshot_interval_secs must be greater than zero");
        }
        if self.tracking.history_max_limit == 0 {
            return fail("tracking.history_max_limit must be greater than zero");
        }
        if self.client.grow_factor < 1.0 {
            return fail("client.grow_factor must be at least 1.0");
        }
        if self.client.min_delay_ms > self.client.max_delay_ms {
            return fail("client.min_delay_ms must not exceed client.max_delay_ms");
        }
        if self.client.connection_timeout_ms == 0 {
            return fail("client.connection_timeout_ms must be greater than zero");
        }
        if self.simulator.steps == 0 {
            return fail("simulator.steps must be greater than zero");
        }

        Ok(())
    }
}

// ==================== Default Value Functions ====================

pub(crate) fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    5000
}

pub(crate) fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
    }
}

pub(crate) fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

pub(crate) fn default_tracking() -> TrackingConfig {
    TrackingConfig {
        path: default_tracking_path(),
        snapshot_interval_secs: default_snapshot_interval_secs(),
        allowed_origins: Vec::new(),
        history_default_limit: default_history_default_limit(),
        history_max_limit: default_history_max_limit(),
    }
}

fn default_tracking_path() -> String {
    "/ws/tracking".to_string()
}

fn default_snapshot_interval_secs() -> u64 {
    5
}

fn default_history_default_limit() -> usize {
    50
}

fn default_history_max_limit() -> usize {
    500
}

pub(crate) fn default_client() -> ClientConfig {
    ClientConfig {
        url: default_client_url(),
        max_retries: default_max_retries(),
        min_delay_ms: default_min_delay_ms(),
        max_delay_ms: default_max_delay_ms(),
        grow_factor: default_grow_factor(),
        connection_timeout_ms: default_connection_timeout_ms(),
    }
}

fn default_client_url() -> String {
    "ws://127.0.0.1:5000/ws/tracking".to_string()
}

fn default_max_retries() -> u32 {
    15
}

fn default_min_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_grow_factor() -> f64 {
    1.3
}

fn default_connection_timeout_ms() -> u64 {
    4000
}

pub(crate) fn default_simulator() -> SimulatorConfig {
    SimulatorConfig {
        entity_id: default_sim_entity_id(),
        kind: EntityKind::Load,
        interval_ms: default_sim_interval_ms(),
        steps: default_sim_steps(),
        start: default_sim_start(),
        end: default_sim_end(),
        status: None,
    }
}

fn default_sim_entity_id() -> i64 {
    1
}

fn default_sim_interval_ms() -> u64 {
    2000
}

fn default_sim_steps() -> u32 {
    30
}

// Casablanca
fn default_sim_start() -> [f64; 2] {
    [33.57, -7.59]
}

// Marrakesh
fn default_sim_end() -> [f64; 2] {
    [31.63, -8.0]
}
