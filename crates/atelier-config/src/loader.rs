//! Configuration loader with layered sources.

use crate::{format_validation_errors, AppConfig, ConfigValidator, WorkerConfig};
use atelier_core::AtelierError;
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Environment variable selecting the environment overlay.
pub const ENVIRONMENT_VAR: &str = "ATELIER_ENVIRONMENT";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `ATELIER__` prefix (`ATELIER__WORKER__SECRET`)
    pub fn new(config_dir: impl Into<String>) -> Result<Self, AtelierError> {
        let config_dir = config_dir.into();
        let config = Self::load_config(&config_dir)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, AtelierError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), AtelierError> {
        let new_config = Self::load_config(&self.config_dir)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    fn load_config(config_dir: &str) -> Result<AppConfig, AtelierError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment =
            std::env::var(ENVIRONMENT_VAR).unwrap_or_else(|_| "development".to_string());

        info!("Loading configuration for environment: {}", environment);

        let mut builder = Config::builder();

        for name in ["default", environment.as_str(), "local"] {
            let path = format!("{}/{}.toml", config_dir, name);
            if Path::new(&path).exists() {
                debug!("Loading config from: {}", path);
                builder = builder.add_source(File::with_name(&path).required(false));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ATELIER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut app_config: AppConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(config_error_to_atelier_error)?;

        if app_config.app.environment != environment {
            app_config.app.environment = environment;
        }

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    fn validate_config(config: &AppConfig) -> Result<(), AtelierError> {
        if config.app.is_production() && config.worker.secret == WorkerConfig::DEFAULT_SECRET {
            warn!("Using default worker secret in production! This is a security risk.");
        }

        ConfigValidator::validate(config)
            .map_err(|errors| AtelierError::Configuration(format_validation_errors(&errors)))
    }

    /// Gets a specific configuration value by key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

#[allow(clippy::needless_pass_by_value)]
fn config_error_to_atelier_error(err: ConfigError) -> AtelierError {
    AtelierError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let mut file = std::fs::File::create(dir.join(name)).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
    }

    #[tokio::test]
    async fn test_loads_default_toml() {
        let dir = tempfile::tempdir().unwrap();
        write_file(
            dir.path(),
            "default.toml",
            r#"
[server]
port = 9001

[worker]
batch_size = 25

[jobs.generate-artifact]
max_retries = 4
credit_cost = 2
"#,
        );

        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        let config = loader.get().await;
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.worker.batch_size, 25);
        assert_eq!(config.jobs.generate_artifact.max_retries, 4);
        assert_eq!(config.dispatcher.interval_secs, 60);
    }

    #[tokio::test]
    async fn test_local_overrides_default() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "default.toml", "[dispatcher]\nconcurrency = 2\n");
        write_file(dir.path(), "local.toml", "[dispatcher]\nconcurrency = 8\n");

        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        assert_eq!(loader.get_value::<usize>("dispatcher.concurrency").await, Some(8));
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "default.toml", "[worker]\nbatch_size = 0\n");

        let result = ConfigLoader::new(dir.path().to_string_lossy());
        assert!(matches!(result, Err(AtelierError::Configuration(msg)) if msg.contains("batch_size")));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "default.toml", "[rate_limit]\nmax_requests = 5\n");
        let loader = ConfigLoader::new(dir.path().to_string_lossy()).unwrap();
        assert_eq!(loader.get().await.rate_limit.max_requests, 5);

        write_file(dir.path(), "default.toml", "[rate_limit]\nmax_requests = 50\n");
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.rate_limit.max_requests, 50);
    }
}
