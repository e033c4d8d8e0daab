//! Session store errors.

use thiserror::Error;
use vlog_models::SessionId;

pub type SessionResult<T> = Result<T, SessionError>;

/// Errors from the on-disk session store.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    NotFound(SessionId),

    #[error("Session conflict: {0}")]
    Conflict(String),

    #[error("Corrupt session state: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SessionError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}
