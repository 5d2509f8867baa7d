//! Sync error types for the pipeline.

use thiserror::Error;

/// Errors that can occur during a synchronization run.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A required configuration value is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An HTTP request to an external provider failed.
    #[error("HTTP error from {source_name}: {message}")]
    Http {
        source_name: String,
        message: String,
    },

    /// A provider response could not be parsed.
    #[error("parse error from {source_name}: {message}")]
    Parse {
        source_name: String,
        message: String,
    },

    /// The catalog provider rejected the credential exchange.
    #[error("authorization failed for {source_name}: {message}")]
    Auth {
        source_name: String,
        message: String,
    },

    /// An error propagated from `reqwest`.
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    /// An error propagated from the history store.
    #[error("store error: {0}")]
    Store(#[from] ritornello_core::Error),
}

impl SyncError {
    /// Returns `true` when the error is transient and the operation may
    /// succeed if retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Request(_))
    }
}

/// Convenience alias for sync results.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
