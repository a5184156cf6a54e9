//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Cancellation is deliberately absent: an abort request ends a session
/// in the `Aborted` state and is reported as an outcome, not an error.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Malformed frame payload on the answer stream (non-fatal).
    Decode(String),
    /// Connection failure not caused by a pending abort request.
    Transport(String),
    /// Explicit `error` event sent by the remote side.
    Upstream(String),
    /// Citation could not be resolved to a navigable location.
    Reference(String),
    /// Another answer is still streaming for the same conversation key.
    SessionBusy(String),
    /// Conversation list/detail API failure.
    Persistence(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Upstream(msg) => write!(f, "upstream: {msg}"),
            Self::Reference(msg) => write!(f, "reference: {msg}"),
            Self::SessionBusy(msg) => write!(f, "session busy: {msg}"),
            Self::Persistence(msg) => write!(f, "persistence: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
