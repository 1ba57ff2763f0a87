//! Service configuration.

pub mod loader;
pub mod static_config;

pub use loader::load_static_config;
pub use static_config::{
    ClientConfig, ServerConfig, SimulatorConfig, StaticConfig, StorageConfig, TrackingConfig,
};
