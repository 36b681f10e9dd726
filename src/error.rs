//! Error types for scenecue
//!
//! Uses thiserror for ergonomic error definitions with clear messages
//! that guide the operator toward fixing common issues.
//!
//! Parse misses, unknown commands and cooldown rejections are not errors;
//! they are returned as values (see [`crate::switcher::SwitchOutcome`]).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the scenecue application
#[derive(Error, Debug)]
pub enum ScenecueError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("OBS error: {0}")]
    Transport(#[from] TransportError),

    #[error("Chat log error: {0}")]
    Source(#[from] SourceError),

    #[error("Switch record error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the OBS WebSocket transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Cannot connect to OBS at {0}. Is OBS running with the WebSocket server enabled (Tools -> WebSocket Server Settings)?")]
    Connection(String),

    #[error("OBS rejected the password: {0}")]
    Auth(String),

    #[error("{request_type} failed (code {code}): {comment}")]
    Request {
        request_type: String,
        code: u16,
        comment: String,
    },

    #[error("OBS did not answer within {0} seconds")]
    Timeout(u64),

    #[error("OBS connection closed")]
    Closed,

    #[error("Unexpected OBS message: {0}")]
    Protocol(String),
}

/// Errors related to the chat log source
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Log directory does not exist: {0}")]
    DirectoryMissing(PathBuf),

    #[error("No file containing '{pattern}' found in {dir}")]
    NoSource { dir: PathBuf, pattern: String },

    #[error("File watcher error: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the switch record database
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using ScenecueError
pub type Result<T> = std::result::Result<T, ScenecueError>;

impl From<notify::Error> for SourceError {
    fn from(e: notify::Error) -> Self {
        SourceError::Watch(e.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match e {
            WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::Closed,
            WsError::Io(io) => TransportError::Connection(io.to_string()),
            other => TransportError::Protocol(other.to_string()),
        }
    }
}

impl TransportError {
    /// Whether a fresh connection might succeed where this one failed
    pub fn is_disconnect(&self) -> bool {
        matches!(self, TransportError::Closed | TransportError::Connection(_))
    }
}
