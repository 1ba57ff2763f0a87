//! Configuration loading from files and environment variables.

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};

use crate::error::{ServiceError, ServiceResult};

use super::static_config::StaticConfig;

/// Load static configuration from file and env vars
///
/// Reads an optional `config.*` file from the working directory, then
/// `TRACKING__SECTION__KEY` environment variables. Lists (such as
/// `TRACKING__TRACKING__ALLOWED_ORIGINS`) are comma separated.
pub fn load_static_config() -> ServiceResult<StaticConfig> {
    let builder = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(
            Environment::with_prefix("TRACKING")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("tracking.allowed_origins"),
        );

    build_static_config(builder)
}

/// Deserialize and validate whatever sources the builder holds
pub(crate) fn build_static_config(
    builder: ConfigBuilder<DefaultState>,
) -> ServiceResult<StaticConfig> {
    let config: StaticConfig = builder
        .build()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to build config: {}", e),
        })?
        .try_deserialize()
        .map_err(|e| ServiceError::Config {
            message: format!("Failed to deserialize static config: {}", e),
        })?;

    config.validate()?;

    Ok(config)
}
