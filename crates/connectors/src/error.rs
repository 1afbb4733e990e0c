//! Error types for connectors

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::resilience::{RetryError, Retryable, is_retryable_error};

/// Errors that can occur during connector operations
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Failed to initialize connector (e.g., HTTP client creation failed)
    #[error("failed to initialize connector: {0}")]
    Init(String),

    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body did not have the expected shape
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an unexpected status
    #[error("API error: HTTP {status}: {message}")]
    Api { status: u16, message: String },

    /// API rate limited
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Request rejected as malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unknown table name
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// Non-retryable failure of a named operation
    #[error("{operation}: {source}")]
    Operation {
        operation: String,
        source: Box<ConnectorError>,
    },

    /// Transient failure that outlived the retry policy
    #[error("{operation} failed after {attempts} attempts: {source}")]
    Exhausted {
        operation: String,
        attempts: u32,
        source: Box<ConnectorError>,
    },

    /// Caller identity could not be resolved for this execution
    #[error("failed to resolve caller identity: {0}")]
    Identity(#[source] Arc<ConnectorError>),
}

impl ConnectorError {
    /// Attach an operation name to the outcome of a retried call
    pub fn from_retry(operation: &str, error: RetryError<ConnectorError>) -> Self {
        match error {
            RetryError::Exhausted {
                attempts,
                last_error,
            } => ConnectorError::Exhausted {
                operation: operation.to_string(),
                attempts,
                source: Box::new(last_error),
            },
            RetryError::Permanent(e) => ConnectorError::Operation {
                operation: operation.to_string(),
                source: Box::new(e),
            },
        }
    }

    /// Innermost error, looking through operation, retry and identity wrappers
    pub fn root_cause(&self) -> &ConnectorError {
        match self {
            ConnectorError::Operation { source, .. } | ConnectorError::Exhausted { source, .. } => {
                source.root_cause()
            }
            ConnectorError::Identity(inner) => inner.root_cause(),
            other => other,
        }
    }

    /// True when the remote resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self.root_cause(), ConnectorError::NotFound(_))
    }
}

impl Retryable for ConnectorError {
    fn is_retryable(&self) -> bool {
        match self {
            ConnectorError::Http(e) => is_retryable_error(e),
            ConnectorError::RateLimited { .. } => true,
            ConnectorError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ConnectorError::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            _ => None,
        }
    }
}
