//! Error types for the session layer.

use crate::AttemptId;

/// Errors that can occur while driving the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A required credential field was empty. Raised before any
    /// connection attempt; the state is left unchanged.
    #[error("missing credentials: {0} is required")]
    MissingCredentials(&'static str),

    /// A connection attempt is already in flight or established.
    #[error("session is already {0}")]
    AlreadyActive(String),

    /// A transport event belongs to an attempt that is no longer current
    /// (it timed out, failed, or was superseded).
    #[error("event for stale {0} ignored")]
    StaleAttempt(AttemptId),

    /// The event is not valid in the current state.
    #[error("cannot handle {event} while {state}")]
    InvalidTransition { state: String, event: &'static str },
}
