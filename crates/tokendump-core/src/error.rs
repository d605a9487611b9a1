//! Error types for token collection and submission.

use std::time::Duration;

/// Errors raised by the requester, the known-depot cache and the HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// A content service call failed.
    #[error("{operation} failed: {message}")]
    Rpc {
        operation: &'static str,
        message: String,
    },

    /// A content service call did not finish within the per-call timeout.
    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Backend rejected the credentials.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Network error.
    #[error("network error: {message}")]
    Network { message: String },

    /// Invalid response from the backend or gateway.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// Known-depot cache error.
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Writing the local payload dump failed.
    #[error("dump error: {message}")]
    Dump { message: String },
}

impl DumpError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,

            Self::Unauthorized { .. } => 3,

            // Network/transient
            Self::RateLimited { .. } => 4,
            Self::Network { .. } => 4,
            Self::Timeout { .. } => 4,

            // Remote side
            Self::Rpc { .. } => 5,
            Self::InvalidResponse { .. } => 5,

            // Local files
            Self::Cache { .. } => 6,
            Self::Dump { .. } => 6,
        }
    }

    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }
}

impl From<reqwest::Error> for DumpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for tokendump operations.
pub type DumpResult<T> = Result<T, DumpError>;
