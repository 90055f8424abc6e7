//! Error types and handling for Meterbook
//!
//! This module defines the error taxonomy shared by the cache, the fetch
//! layer and the sync coordinator. The split matters for control flow:
//! authentication failures bubble up to the caller, transport and API
//! failures are retried and then skipped, and cache corruption never leaves
//! the store.

use thiserror::Error;

/// Result type alias for Meterbook operations
pub type Result<T> = std::result::Result<T, MeterbookError>;

/// Main error type for Meterbook
#[derive(Debug, Error)]
pub enum MeterbookError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Transport failures: refused connections, resets, 5xx responses
    #[error("Network error: {message}")]
    Network { message: String },

    /// Semantic rejection by the upstream API (unknown contract, bad parameters)
    #[error("API error: {message}")]
    Api { message: String },

    /// Session expired or credentials rejected
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Persisted cache payload is structurally invalid
    #[error("Cache corruption: {message}")]
    CacheCorruption { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl MeterbookError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        MeterbookError::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        MeterbookError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        MeterbookError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        MeterbookError::Network {
            message: message.into(),
        }
    }

    /// Create a new API error
    pub fn api<S: Into<String>>(message: S) -> Self {
        MeterbookError::Api {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        MeterbookError::Auth {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        MeterbookError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new cache corruption error
    pub fn cache_corruption<S: Into<String>>(message: S) -> Self {
        MeterbookError::CacheCorruption {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        MeterbookError::Generic {
            message: message.into(),
        }
    }

    /// Whether a fetch that failed with this error may be attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MeterbookError::Network { .. } | MeterbookError::Timeout { .. } | MeterbookError::Api { .. }
        )
    }

    /// Whether the caller has to re-authenticate before trying again
    pub fn is_auth(&self) -> bool {
        matches!(self, MeterbookError::Auth { .. })
    }
}

impl From<std::io::Error> for MeterbookError {
    fn from(err: std::io::Error) -> Self {
        MeterbookError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for MeterbookError {
    fn from(err: serde_yaml::Error) -> Self {
        MeterbookError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for MeterbookError {
    fn from(err: serde_json::Error) -> Self {
        MeterbookError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for MeterbookError {
    fn from(err: tokio::task::JoinError) -> Self {
        MeterbookError::generic(format!("Background task failed: {}", err))
    }
}

#[cfg(feature = "contact")]
impl From<reqwest::Error> for MeterbookError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MeterbookError::timeout(err.to_string())
        } else {
            MeterbookError::network(err.to_string())
        }
    }
}

impl From<chrono::ParseError> for MeterbookError {
    fn from(err: chrono::ParseError) -> Self {
        MeterbookError::validation("datetime", err.to_string().as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = MeterbookError::config("test config error");
        assert!(matches!(err, MeterbookError::Config { .. }));

        let err = MeterbookError::cache_corruption("missing metadata");
        assert!(matches!(err, MeterbookError::CacheCorruption { .. }));

        let err = MeterbookError::validation("field", "test validation error");
        assert!(matches!(err, MeterbookError::Validation { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = MeterbookError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = MeterbookError::validation("sync.hourly.window", "too large");
        assert_eq!(
            format!("{}", err),
            "Validation error: sync.hourly.window - too large"
        );
    }

    #[test]
    fn test_retry_classification() {
        assert!(MeterbookError::network("reset").is_retryable());
        assert!(MeterbookError::timeout("60s").is_retryable());
        assert!(MeterbookError::api("404").is_retryable());
        assert!(!MeterbookError::auth("401").is_retryable());
        assert!(!MeterbookError::io("disk full").is_retryable());
        assert!(MeterbookError::auth("401").is_auth());
    }
}
