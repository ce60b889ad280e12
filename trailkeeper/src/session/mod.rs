//! Tracking session state machine.
//!
//! The session decides when the background location service runs and what
//! gets appended to the path:
//!
//! - `start` is accepted only from Idle and only while readiness is eligible
//! - the path is cleared at each accepted start and kept after every stop
//! - losing readiness while Starting or Active stops the service exactly once
//! - a start that is never acknowledged falls back to Idle after a timeout
//! - screen teardown detaches readiness but never stops a running session

mod error;
mod state;
mod tracker;

pub use error::SessionError;
pub use state::{SessionCommand, SessionId, SessionSnapshot, SessionState, StopReason};
pub use tracker::{TrackingSession, TrackingSessionHandle};
