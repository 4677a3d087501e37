//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod access;
pub mod app;
pub mod identity;
pub mod logging;
pub mod reconciler;

use serde::{Deserialize, Serialize};

pub use self::access::{AccessConfig, ClusterConfig, RetentionPolicy};
pub use self::app::ServerConfig;
pub use self::identity::{IdentityConfig, StaticPeerConfig};
pub use self::logging::LoggingConfig;
pub use self::reconciler::ReconcilerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Capability, retention and cluster settings.
    #[serde(default)]
    pub access: AccessConfig,
    /// Reconciler work-queue and scheduling settings.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    /// Mesh identity resolution settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `MESHGATE_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("MESHGATE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.access.capability_key.trim().is_empty() {
            return Err(AppError::configuration("access.capability_key must not be empty"));
        }
        if self.reconciler.concurrency == 0 {
            return Err(AppError::configuration("reconciler.concurrency must be at least 1"));
        }
        if self.reconciler.base_backoff_ms > self.reconciler.max_backoff_seconds * 1000 {
            return Err(AppError::configuration(
                "reconciler.base_backoff_ms must not exceed reconciler.max_backoff_seconds",
            ));
        }
        Ok(())
    }
}
