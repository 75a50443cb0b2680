//! # Reader Error Types
//!
//! Structured error handling for keyset paging readers using thiserror.
//! Query failures are carried through unmodified in meaning so the host's own
//! retry/restart policy can decide whether to re-read a page.

use thiserror::Error;

/// Comprehensive reader error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReaderError {
    #[error("Resource acquisition failed: {message}")]
    ResourceAcquisition { message: String },

    #[error("Query error: {operation}: {message}")]
    Query { operation: String, message: String },

    #[error("Transaction error: {operation}: {message}")]
    Transaction { operation: String, message: String },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Parameter error: {name}: {message}")]
    Parameter { name: String, message: String },

    #[error("Invalid reader state: cannot {operation} while {state}")]
    State { operation: String, state: String },

    #[error("Cursor regression: next cursor {next} sorts before previous cursor {previous}")]
    CursorRegression { previous: String, next: String },

    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },
}

impl ReaderError {
    /// Create a resource acquisition error
    pub fn resource_acquisition(message: impl Into<String>) -> Self {
        Self::ResourceAcquisition {
            message: message.into(),
        }
    }

    /// Create a query error
    pub fn query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transaction {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a parameter binding error
    pub fn parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a lifecycle state error
    pub fn state(operation: impl Into<String>, state: impl ToString) -> Self {
        Self::State {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// Create a cursor regression error
    pub fn cursor_regression(previous: impl Into<String>, next: impl Into<String>) -> Self {
        Self::CursorRegression {
            previous: previous.into(),
            next: next.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Whether the host may retry the failed call with unchanged reader state
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Query { .. } | Self::Transaction { .. })
    }
}

impl From<sqlx::Error> for ReaderError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::resource_acquisition(error.to_string())
            }
            sqlx::Error::Configuration(_) => Self::configuration("database", error.to_string()),
            other => Self::query("execute", other.to_string()),
        }
    }
}

impl From<crate::config::ConfigurationError> for ReaderError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        Self::configuration("config", error.to_string())
    }
}

pub type ReaderResult<T> = std::result::Result<T, ReaderError>;
