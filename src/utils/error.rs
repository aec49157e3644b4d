// src/utils/error.rs
use std::io;
use thiserror::Error;

/// Main error type for the mining application
///
/// This enum represents all possible error conditions that can occur
/// while talking to a pool, building work and searching for shares.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Transport-level failures (refused, reset, closed by peer)
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Malformed or unexpected Stratum messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// The pool refused `mining.subscribe`
    #[error("Subscription failed: {0}")]
    SubscriptionError(String),

    /// The pool refused `mining.authorize`
    #[error("Authorization failed: {0}")]
    AuthorizationError(String),

    /// A connect attempt or handshake response did not arrive in time
    #[error("Timed out: {0}")]
    TimeoutError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Search thread startup or shutdown failures
    #[error("Task execution error: {0}")]
    TaskError(String),
}

impl MinerError {
    /// Whether the error only ends the current connection.
    ///
    /// Transport, timeout and handshake failures are answered with a
    /// reconnect; everything else stops the client.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            MinerError::ConnectionError(_)
                | MinerError::TimeoutError(_)
                | MinerError::IoError(_)
                | MinerError::SubscriptionError(_)
                | MinerError::AuthorizationError(_)
                | MinerError::ProtocolError(_)
        )
    }
}

/// Converts hex decoding errors into MinerError
///
/// Every binary field of a Stratum job arrives hex encoded, so a bad
/// digit is reported as malformed input.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}
