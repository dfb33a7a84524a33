//! Structured error model for extractor and store operations.
//!
//! [`ConnectorError`] carries classification and retry metadata so the
//! engine's retry policy can tell a transient fault from a fatal one.
//! Construct via category-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a collaborator error.
///
/// Determines default retry behavior and operator-facing categorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The requested source does not exist on the platform.
    NotFound,
    /// Invalid extractor or store configuration.
    Config,
    /// Platform rate limit exceeded (retryable).
    RateLimit,
    /// Connectivity failure talking to the platform (retryable).
    TransientNetwork,
    /// Storage I/O or contention failure (retryable).
    TransientStore,
    /// Malformed payload returned by the platform.
    Data,
    /// Internal collaborator error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::Config => "config",
            Self::RateLimit => "rate_limit",
            Self::TransientNetwork => "transient_network",
            Self::TransientStore => "transient_store",
            Self::Data => "data",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Retry backoff strategy hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffClass {
    /// Retry sooner than the configured base delay.
    Fast,
    /// Use the configured base delay.
    Normal,
    /// Back off harder than the configured base delay.
    Slow,
}

/// Structured error from an extractor or store operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] {code}: {message}")]
pub struct ConnectorError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    pub backoff_class: BackoffClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ConnectorError {
    fn new(
        category: ErrorCategory,
        retryable: bool,
        backoff_class: BackoffClass,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retryable,
            retry_after_ms: None,
            backoff_class,
            details: None,
        }
    }

    /// Unknown source (not retryable).
    #[must_use]
    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, false, BackoffClass::Normal, code, message)
    }

    /// Configuration error (not retryable).
    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, false, BackoffClass::Normal, code, message)
    }

    /// Rate limit error (retryable, slow backoff).
    #[must_use]
    pub fn rate_limit(
        code: impl Into<String>,
        message: impl Into<String>,
        retry_after_ms: Option<u64>,
    ) -> Self {
        let mut err = Self::new(ErrorCategory::RateLimit, true, BackoffClass::Slow, code, message);
        err.retry_after_ms = retry_after_ms;
        err
    }

    /// Transient network error (retryable, normal backoff).
    #[must_use]
    pub fn transient_network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TransientNetwork, true, BackoffClass::Normal, code, message)
    }

    /// Transient storage error (retryable, normal backoff).
    #[must_use]
    pub fn transient_store(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TransientStore, true, BackoffClass::Normal, code, message)
    }

    /// Malformed data error (not retryable).
    #[must_use]
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Data, false, BackoffClass::Normal, code, message)
    }

    /// Internal error (not retryable).
    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, false, BackoffClass::Normal, code, message)
    }

    /// Attach structured diagnostic details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Override the default backoff hint.
    #[must_use]
    pub fn with_backoff(mut self, backoff_class: BackoffClass) -> Self {
        self.backoff_class = backoff_class;
        self
    }

    /// True when the failure is classified fatal (never retried).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !self.retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_fatal() {
        let err = ConnectorError::not_found("UNKNOWN_SOURCE", "no such chat 42");
        assert_eq!(err.category, ErrorCategory::NotFound);
        assert!(!err.retryable);
        assert!(err.is_fatal());
        assert_eq!(err.backoff_class, BackoffClass::Normal);
    }

    #[test]
    fn transient_errors_are_retryable() {
        let net = ConnectorError::transient_network("TIMEOUT", "timed out");
        assert!(net.retryable);

        let store = ConnectorError::transient_store("BUSY", "database is locked");
        assert!(store.retryable);
        assert_eq!(store.category, ErrorCategory::TransientStore);
    }

    #[test]
    fn rate_limit_carries_retry_after() {
        let err = ConnectorError::rate_limit("FLOOD_WAIT", "slow down", Some(5000));
        assert!(err.retryable);
        assert_eq!(err.retry_after_ms, Some(5000));
        assert_eq!(err.backoff_class, BackoffClass::Slow);
    }

    #[test]
    fn serde_roundtrip() {
        let err = ConnectorError::rate_limit("THROTTLED", "slow down", Some(5000))
            .with_details(serde_json::json!({"source": "42"}));
        let json = serde_json::to_string(&err).unwrap();
        let back: ConnectorError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn display_format() {
        let err = ConnectorError::config("BAD_PATH", "export directory missing");
        assert_eq!(err.to_string(), "[config] BAD_PATH: export directory missing");
    }
}
