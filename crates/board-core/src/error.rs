//! Error types for the board core library.

use thiserror::Error;

use crate::types::TaskId;

/// Why a lock or edit operation was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockConflict {
    #[error("The task is locked by someone else")]
    LockedBySomeoneElse,

    #[error("The task is currently edited by someone else")]
    EditedBySomeoneElse,

    #[error("The task is not locked")]
    NotLocked,

    #[error("You already have the edit permission")]
    HeldByRequester,

    #[error("You have already asked for the edit permission")]
    AlreadyRequested,

    #[error("You have to wait {remaining_ms} ms more before getting the edit permission")]
    MustWait { remaining_ms: i64 },

    #[error("Someone else also asked for the edit permission, your request was cancelled")]
    RequestSuperseded,

    #[error("There is no pending edit permission request")]
    NoPendingRequest,
}

/// Board error taxonomy surfaced to request handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoardError {
    /// Missing or empty required input.
    #[error("{0}")]
    Validation(String),

    /// Task absent or soft-deleted.
    #[error("Task Not Found: {0}")]
    NotFound(TaskId),

    /// Lock, permission or timing violation.
    #[error(transparent)]
    Conflict(#[from] LockConflict),

    /// Store failure or allocator exhaustion.
    #[error("{0}")]
    Internal(String),
}

impl BoardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using the board error type.
pub type Result<T> = std::result::Result<T, BoardError>;
