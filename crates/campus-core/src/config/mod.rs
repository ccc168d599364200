//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate. Each
//! sub-module represents a logical configuration section, and every field
//! carries a default so an empty source set still yields a usable config.

pub mod api;
pub mod connection;
pub mod hubs;
pub mod logging;
pub mod presence;
pub mod reconnect;

use serde::{Deserialize, Serialize};

pub use self::api::ApiConfig;
pub use self::connection::ConnectionConfig;
pub use self::hubs::HubsConfig;
pub use self::logging::{LogFormat, LoggingConfig};
pub use self::presence::PresenceConfig;
pub use self::reconnect::ReconnectConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// REST API settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// Hub endpoint locations.
    #[serde(default)]
    pub hubs: HubsConfig,
    /// Hub connection lifecycle settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Reconnect policy settings.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    /// QR check-in settings.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from files and the environment.
    ///
    /// Merges `config/default`, an environment-specific overlay
    /// `config/{env}` and environment variables prefixed with `CAMPUS`. The
    /// prefix and every nesting level are separated by `__`
    /// (`CAMPUS__CONNECTION__TEARDOWN_GRACE_MS=0`).
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("CAMPUS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml(document: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(document, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}
