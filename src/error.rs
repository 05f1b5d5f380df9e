//! Error types returned by the monitor service

use std::fmt;

use crate::model::TargetId;

/// Result type alias for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Errors surfaced to callers of the monitor service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Registration input was rejected, nothing was created
    Validation(String),

    /// The referenced target does not exist
    TargetNotFound(TargetId),

    /// An agent report arrived without a secret
    MissingSecret,

    /// No agent target owns the presented secret
    UnknownSecret,

    /// The state actor is gone (shutdown or crashed)
    Unavailable(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::Validation(msg) => write!(f, "validation failed: {msg}"),
            MonitorError::TargetNotFound(id) => write!(f, "target {id} not found"),
            MonitorError::MissingSecret => write!(f, "agent secret required"),
            MonitorError::UnknownSecret => write!(f, "invalid agent secret"),
            MonitorError::Unavailable(msg) => write!(f, "monitor unavailable: {msg}"),
        }
    }
}

impl std::error::Error for MonitorError {}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MonitorError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MonitorError::Unavailable("command channel closed".to_string())
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for MonitorError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        MonitorError::Unavailable("no response from state actor".to_string())
    }
}
