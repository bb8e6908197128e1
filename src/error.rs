//! Error types for picklist operations

use thiserror::Error;

/// Unified error type for picklist operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed (network error, timeout, etc.)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// Failed to parse a JSON payload
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// ManaPool credentials are absent
    #[error("ManaPool not configured")]
    NotConfigured,
    /// The upstream marketplace API failed after retries
    #[error("{0}")]
    Upstream(String),
    /// Lookup of a row that does not exist
    #[error("not found")]
    NotFound,
}

/// Result alias for picklist operations
pub type Result<T> = std::result::Result<T, Error>;
