//! # Reader Configuration System
//!
//! Configuration for keyset paging readers, loaded from YAML files with
//! environment-specific overrides and `KEYSET_READER__*` environment variables.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keyset_reader::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let page_size = manager.config().page_size;
//! let transacted = manager.config().transacted;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Sentinel lower bound used by the transactional reader for its first page
pub const DEFAULT_INITIAL_CURSOR: &str = "00000000000000";

/// Token replaced with the comparison operator in custom query strings
pub const OPERATOR_TOKEN: &str = "{operator}";

/// Root reader configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reader name, used as the execution-context key prefix
    pub name: String,

    /// Maximum rows per page
    pub page_size: u32,

    /// Wrap every page fetch in its own transaction
    pub transacted: bool,

    /// Persist the cursor into the execution context for restarts
    pub save_state: bool,

    /// Cursor-column value of the inclusive first-page sentinel key of the transactional reader
    pub initial_cursor: String,

    /// Custom page query with an `{operator}` token and `:last_id` (plus `:last_<column>`) placeholders
    pub query_string: Option<String>,

    /// Extra predicate ANDed into the default page query
    pub filter: Option<String>,

    /// Auxiliary named parameters bound into every page query
    pub parameters: BTreeMap<String, serde_json::Value>,

    /// Settings applied to every transaction via `set_config`
    pub session_properties: BTreeMap<String, String>,

    pub database: DatabaseConfig,

    pub logging: LoggingConfig,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            name: "keyset-reader".to_string(),
            page_size: 10,
            transacted: true,
            save_state: false,
            initial_cursor: DEFAULT_INITIAL_CURSOR.to_string(),
            query_string: None,
            filter: None,
            parameters: BTreeMap::new(),
            session_properties: BTreeMap::new(),
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ReaderConfig {
    /// Validate the configuration before any reader is built from it
    pub fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "name",
                "reader configuration",
            ));
        }

        if self.page_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "page_size",
                "0",
                "page size must be greater than 0",
            ));
        }

        if let Some(query) = &self.query_string {
            if !query.contains(OPERATOR_TOKEN) {
                return Err(ConfigurationError::invalid_value(
                    "query_string",
                    query.clone(),
                    format!("custom query must contain the {OPERATOR_TOKEN} token"),
                ));
            }
        }

        for name in self.parameters.keys() {
            if !is_valid_parameter_name(name) {
                return Err(ConfigurationError::invalid_value(
                    "parameters",
                    name.clone(),
                    "parameter names must be identifiers ([A-Za-z_][A-Za-z0-9_]*)",
                ));
            }
        }

        self.database.validate()
    }
}

/// Whether `name` can appear as a `:name` placeholder
pub fn is_valid_parameter_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Database connection and pooling configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection URL; takes precedence over the individual components
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "keyset_reader_development".to_string(),
            max_connections: 5,
            acquire_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Build complete database URL from configuration
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.url {
            if url == "${DATABASE_URL}" {
                if let Ok(env_url) = std::env::var("DATABASE_URL") {
                    return env_url;
                }
            } else if !url.is_empty() {
                return url.clone();
            }
        }

        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Pool acquire timeout as Duration
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if self.url.as_deref().map_or(true, str::is_empty) && self.host.is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.host",
                "database configuration",
            ));
        }

        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
