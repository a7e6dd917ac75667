//! Error types for the holder indexer.

use thiserror::Error;

/// Errors produced while reading the token contract or maintaining the ledger.
#[derive(Debug, Error)]
pub enum HolderIndexerError {
    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Transport-level JSON-RPC failure (HTTP, WebSocket, malformed envelope).
    #[error("RPC error: {0}")]
    RpcError(String),

    /// A contract read reverted or returned an unusable result.
    #[error("Contract call failed: {0}")]
    ContractError(String),

    /// ABI or log payload could not be decoded.
    #[error("Decoding error: {0}")]
    DecodingError(String),

    /// The endpoint is serving a different chain than the one configured.
    #[error("Network mismatch: expected chain {expected}, connected to {actual}")]
    NetworkMismatch { expected: u64, actual: u64 },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Both the aggregate query and the event replay failed.
    #[error("Ledger reconstruction failed (aggregate: {aggregate}; replay: {replay})")]
    ReconstructionFailed { aggregate: String, replay: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<alloy::transports::TransportError> for HolderIndexerError {
    fn from(err: alloy::transports::TransportError) -> Self {
        Self::RpcError(err.to_string())
    }
}

/// Reverts and undecodable return data are contract failures; anything
/// that never reached the contract stays an RPC failure.
impl From<alloy::contract::Error> for HolderIndexerError {
    fn from(err: alloy::contract::Error) -> Self {
        match err {
            alloy::contract::Error::TransportError(e) if !e.is_error_resp() => {
                Self::RpcError(e.to_string())
            }
            other => Self::ContractError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for HolderIndexerError {
    fn from(err: serde_json::Error) -> Self {
        Self::DecodingError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for HolderIndexerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::RpcError(format!("WebSocket error: {err}"))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HolderIndexerError>;
