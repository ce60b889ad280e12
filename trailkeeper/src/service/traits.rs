//! Contract between the tracking session and the background location process.
//!
//! The background process is whatever keeps sampling alive while the screen
//! is not in the foreground. From the session's point of view it:
//!
//! - accepts a start command and acknowledges it by handing back an event
//!   stream, or fails
//! - emits position samples on that stream while running
//! - accepts a stop command and acknowledges it once terminated
//!
//! # Dyn Compatibility
//!
//! Methods return `BoxFuture<'static, _>` so the session can hold
//! `Arc<dyn BackgroundService>` and spawn the returned futures without
//! borrowing the service.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::path::Position;
use crate::session::SessionId;
use crate::BoxFuture;

/// Events emitted by a running background process.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceEvent {
    /// A new position sample.
    Position(Position),

    /// The process ended without being asked to.
    Terminated {
        /// Platform-supplied reason, for logs.
        reason: String,
    },
}

/// Stream of events for one running session.
///
/// Closing the stream without a [`ServiceEvent::Terminated`] is treated the
/// same as an unexpected termination.
pub type ServiceEvents = mpsc::Receiver<ServiceEvent>;

/// Errors from the background process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The platform refused to start the process.
    #[error("Background service rejected start: {0}")]
    StartRejected(String),

    /// No acknowledgment arrived in time.
    #[error("Background service did not acknowledge within {timeout:?}")]
    AckTimeout { timeout: Duration },

    /// The service cannot be reached at all.
    #[error("Background service unavailable: {0}")]
    Unavailable(String),
}

/// Long-running process that keeps producing position samples.
///
/// Start and stop for one session may come from different screen instances;
/// only the [`SessionId`] ties them together.
pub trait BackgroundService: Send + Sync {
    /// Start sampling for `session`.
    ///
    /// Resolving with `Ok` is the start acknowledgment.
    fn start(&self, session: SessionId) -> BoxFuture<'static, Result<ServiceEvents, ServiceError>>;

    /// Stop sampling for `session`.
    ///
    /// Resolving is the termination acknowledgment. Stopping a session that
    /// is not running must resolve promptly.
    fn stop(&self, session: SessionId) -> BoxFuture<'static, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::AckTimeout {
            timeout: Duration::from_secs(10),
        };
        assert!(err.to_string().contains("10s"));

        let err = ServiceError::StartRejected("no foreground permission".to_string());
        assert!(err.to_string().contains("no foreground permission"));
    }
}
