//! Error taxonomy for the transaction kernel.
//!
//! Commit failures self-heal: nothing reaches history and the document is
//! back where it started. Replay failures cannot self-heal, so the manager
//! freezes history until the caller acknowledges or resets it.

use crate::request::{RequestId, RequestStatus};
use crate::session::SessionId;
use fp_core::FieldError;
use thiserror::Error;

/// A request's commit step failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CommitError {
    #[error("request {request} cannot be committed: it is {status}")]
    AlreadyCommitted {
        request: RequestId,
        status: RequestStatus,
    },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("commit rejected: {0}")]
    Rejected(String),

    #[error("commit cancelled")]
    Cancelled,

    #[error("child {index} ({request}) failed: {source}")]
    Child {
        index: usize,
        request: RequestId,
        source: Box<CommitError>,
    },

    #[error("commit of {request} failed ({commit}) and its rollback failed too: {rollback}")]
    RollbackFailed {
        request: RequestId,
        commit: Box<CommitError>,
        rollback: Box<ReplayError>,
    },
}

/// A committed unit's undo or redo step failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReplayError {
    #[error("cannot {action} {request}: it is {status}")]
    InvalidStatus {
        request: RequestId,
        status: RequestStatus,
        action: &'static str,
    },

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error("replay failed: {0}")]
    Failed(String),

    #[error("child {index} ({request}) failed: {source}")]
    Child {
        index: usize,
        request: RequestId,
        source: Box<ReplayError>,
    },
}

/// Errors surfaced by the manager's public operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TxnError {
    #[error("unknown request type '{0}'")]
    UnknownRequestType(String),

    #[error("invalid arguments for '{request_type}': {reason}")]
    InvalidArguments {
        request_type: String,
        reason: String,
    },

    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),

    #[error("session {0} is already open")]
    SessionAlreadyOpen(SessionId),

    #[error("session {0} is closed")]
    SessionClosed(SessionId),

    #[error("session {0} is open; close it before undo, redo or a direct commit")]
    SessionInProgress(SessionId),

    #[error("undo replay failed, history frozen: {0}")]
    UndoReplayFailure(#[source] ReplayError),

    #[error("redo replay failed, history frozen: {0}")]
    RedoReplayFailure(#[source] ReplayError),

    #[error("history is frozen after a replay failure; acknowledge or reset it")]
    HistoryFrozen,

    #[error("another operation is in flight")]
    Busy,

    #[error("invalid history config: {0}")]
    Config(String),
}

impl TxnError {
    pub(crate) fn invalid(request_type: &str, reason: impl Into<String>) -> Self {
        TxnError::InvalidArguments {
            request_type: request_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Replay failures leave the document in a state history cannot vouch for.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TxnError::UndoReplayFailure(_) | TxnError::RedoReplayFailure(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TxnError>;
