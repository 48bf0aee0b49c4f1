//! Error types for the client.

use thiserror::Error;

/// Main error type for client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failure. Non-fatal: the connection transitions to
    /// Disconnected and the caller may retry with a fresh `connect`.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Malformed or unrecognized frame. The frame is dropped; the
    /// connection stays up.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation rejected in the current state (e.g. bulk-loading a
    /// recording while connected, or setting a value on an unpublished
    /// topic).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Structurally unreadable recording source; the whole import is
    /// aborted and prior state left untouched.
    #[error("Import error: {0}")]
    Import(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Deserialization(e.to_string())
    }
}

impl From<tungstenite::Error> for ClientError {
    fn from(e: tungstenite::Error) -> Self {
        ClientError::Connection(e.to_string())
    }
}

impl From<rmp::encode::ValueWriteError> for ClientError {
    fn from(e: rmp::encode::ValueWriteError) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<rmp::decode::ValueReadError> for ClientError {
    fn from(e: rmp::decode::ValueReadError) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

impl From<rmp::decode::NumValueReadError> for ClientError {
    fn from(e: rmp::decode::NumValueReadError) -> Self {
        ClientError::Protocol(e.to_string())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
