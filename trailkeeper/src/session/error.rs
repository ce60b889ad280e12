//! Tracking session error types.

use thiserror::Error;

use super::{SessionCommand, SessionState};
use crate::service::ServiceError;

/// Errors surfaced by the tracking session.
///
/// None of these are fatal. Each leaves the session in a well-defined state,
/// and the ones that end a session are also kept in
/// [`SessionSnapshot::last_error`](super::SessionSnapshot::last_error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Start was requested while a precondition is unmet.
    #[error("Tracking is not eligible to start")]
    NotEligible,

    /// The command is not valid in the current state.
    #[error("Cannot {command} while {from}")]
    InvalidTransition {
        from: SessionState,
        command: SessionCommand,
    },

    /// The background process failed to acknowledge a start.
    #[error("Background start failed: {0}")]
    BackgroundStartFailure(#[source] ServiceError),

    /// The background process died while the session was active.
    #[error("Background process terminated unexpectedly: {reason}")]
    UnexpectedTermination { reason: String },

    /// The session task is no longer running.
    #[error("Tracking session is closed")]
    Closed,
}
