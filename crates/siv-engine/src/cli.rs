//! Configuration and logging setup shared by the binaries.

use std::path::PathBuf;

use siv_core::config::{ConfigError, LoggingConfig, SimulationConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration path.
pub const CONFIG_ENV: &str = "SIV_CONFIG";

/// Configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "siv-config.yaml";

/// Path of the configuration file, from [`CONFIG_ENV`] or the default.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}

/// Loads the configuration, falling back to defaults when no file exists.
///
/// A path named by [`CONFIG_ENV`] must exist.
pub fn load_config() -> Result<SimulationConfig, ConfigError> {
    let path = config_path();
    if path.exists() || std::env::var_os(CONFIG_ENV).is_some() {
        SimulationConfig::from_file(&path)
    } else {
        Ok(SimulationConfig::default())
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    info!(config = %config_path().display(), json = logging.json, "Logging initialized");
}
