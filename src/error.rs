//! Error types for xrplink-node.

/// Errors produced by xrplink-node components.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Document store operation failed.
    #[error("Storage error: {0}")]
    Store(String),

    /// Signing platform request failed or returned an unusable response.
    #[error("Signing platform error: {0}")]
    Platform(String),

    /// Ledger provider was unreachable or returned an error response.
    #[error("Ledger provider error: {0}")]
    Ledger(String),

    /// Escrow execution service request failed.
    #[error("Escrow service error: {0}")]
    Escrow(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for xrplink-node operations.
pub type Result<T> = std::result::Result<T, Error>;
