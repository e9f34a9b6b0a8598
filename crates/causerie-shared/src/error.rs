use thiserror::Error;

use crate::types::{CallStatus, UserId};

/// Errors produced by the messaging core.
///
/// Validation failures are raised before any write reaches the store;
/// conflicts are typed so callers can retry deliberately instead of blindly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed input, rejected before any side effect.
    #[error("validation error: {0}")]
    Validation(String),

    /// The nickname is already reserved by a different user.
    #[error("nickname '{0}' is already taken")]
    NicknameTaken(String),

    /// A call state transition attempted from an invalid source state.
    #[error("invalid call transition: {from} -> {to}")]
    InvalidCallTransition { from: CallStatus, to: CallStatus },

    /// Presence data shows the call target offline.
    #[error("call target {0} is offline")]
    TargetUnavailable(UserId),

    /// A referenced chat, user, message or call does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The store or network is unreachable.  The core never retries on its
    /// own; retry policy belongs to the caller.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// No authenticated user in the current session.
    #[error("not authenticated")]
    Unauthenticated,
}

/// Convenience alias used throughout the workspace.
pub type CoreResult<T> = std::result::Result<T, CoreError>;
