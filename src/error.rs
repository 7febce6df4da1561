use thiserror::Error;

use crate::db::ChatId;

pub type ChatResult<T> = Result<T, ChatError>;

/// Failures of the chat core. Action paths hand these back to the HTTP layer;
/// signal paths log and drop them.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid or missing credential")]
    Authentication,

    #[error("user {0} does not exist")]
    UnknownUser(i64),

    #[error("{0}")]
    Permission(String),

    #[error("{0}")]
    Conflict(String),

    #[error("direct message already exists")]
    DirectChatExists { chat_id: ChatId },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("storage failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl ChatError {
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Storage failures are the only ones worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }

    /// Turns a unique-constraint violation into a `Conflict`, leaving every
    /// other storage error as `Persistence`.
    pub(crate) fn from_insert(err: sqlx::Error, conflict: &str) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::conflict(conflict),
            _ => Self::Persistence(err),
        }
    }
}
