//! Configuration Loader
//!
//! Environment-aware configuration loading. Merges the base YAML file, the
//! environment override file and `KEYSET_READER__*` environment variables.

use super::error::{ConfigResult, ConfigurationError};
use super::ReaderConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Base name of the configuration files (`keyset-reader.yaml`, `keyset-reader.<env>.yaml`)
pub const CONFIG_FILE_STEM: &str = "keyset-reader";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "KEYSET_READER";

/// Loaded configuration together with the environment it was resolved for
#[derive(Debug)]
pub struct ConfigManager {
    config: ReaderConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = environment,
            reader = %config.name,
            page_size = config.page_size,
            transacted = config.transacted,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Environment the configuration was resolved for
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Directory the configuration files were read from
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with the database password masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null);
        if let Some(database) = value.get_mut("database").and_then(|d| d.as_object_mut()) {
            if database.contains_key("password") {
                database.insert("password".to_string(), "***".into());
            }
            if let Some(serde_json::Value::String(url)) = database.get("url").cloned() {
                database.insert("url".to_string(), mask_url_password(&url).into());
            }
        }
        value
    }

    fn load_and_merge_config(directory: &Path, environment: &str) -> ConfigResult<ReaderConfig> {
        let base = directory.join(format!("{CONFIG_FILE_STEM}.yaml"));
        let overrides = directory.join(format!("{CONFIG_FILE_STEM}.{environment}.yaml"));

        let merged = Config::builder()
            .add_source(File::from(base.as_path()).format(FileFormat::Yaml).required(false))
            .add_source(
                File::from(overrides.as_path())
                    .format(FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(directory.display().to_string(), e))?;

        Ok(merged.try_deserialize::<ReaderConfig>()?)
    }

    fn detect_environment() -> String {
        env::var("KEYSET_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}

fn mask_url_password(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    match rest[..at].find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &url[..scheme_end + 3],
            &rest[..colon],
            &rest[at..]
        ),
        None => url.to_string(),
    }
}
