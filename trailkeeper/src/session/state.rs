//! Tracking session states and the snapshot published to observers.
//!
//! # State Machine
//!
//! ```text
//!           start (eligible)         start acknowledged
//!   Idle ─────────────────► Starting ─────────────────► Active
//!    ▲  ◄───────────────────┘  │                         │  │
//!    │    start failed /       │ stop / readiness lost   │  │ process died
//!    │    ack timeout          ▼                         │  │ (path kept)
//!    │                      Stopping ◄───────────────────┘  │
//!    │    stop acknowledged    │   stop / readiness lost    │
//!    └─────────────────────────┴────────────────────────────┘
//! ```
//!
//! The background process is running exactly while the state is `Starting`
//! or `Active`.

use std::fmt;

use super::SessionError;

/// Logical identity of one tracking run.
///
/// Every background start and stop carries the id, so commands issued from
/// different screen instances still address the same process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw id.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Tracking session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Not tracking. Initial state and the state after every stop.
    #[default]
    Idle,
    /// Background start issued, waiting for acknowledgment.
    Starting,
    /// Background process running; samples are appended to the path.
    Active,
    /// Background stop issued, waiting for termination.
    Stopping,
}

impl SessionState {
    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, Active)
                | (Starting, Stopping)
                | (Starting, Idle)
                | (Active, Stopping)
                | (Active, Idle)
                | (Stopping, Idle)
        )
    }

    /// Whether the background process should be running.
    pub fn is_running(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Active)
    }

    /// Short user-facing label.
    pub fn display_status(&self) -> &'static str {
        match self {
            SessionState::Idle => "Stopped",
            SessionState::Starting => "Starting...",
            SessionState::Active => "Tracking",
            SessionState::Stopping => "Stopping...",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Starting => "Starting",
            SessionState::Active => "Active",
            SessionState::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

/// User-level commands accepted by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// Begin tracking.
    Start,
    /// End tracking.
    Stop,
}

impl fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Start => f.write_str("start"),
            SessionCommand::Stop => f.write_str("stop"),
        }
    }
}

/// Why a session left `Starting` or `Active` toward `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The user asked to stop.
    Requested,
    /// A readiness precondition became false.
    IneligibleReadiness,
    /// The session owner is shutting down.
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Requested => f.write_str("requested"),
            StopReason::IneligibleReadiness => f.write_str("readiness lost"),
            StopReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

/// Observable state of the tracking session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current state.
    pub state: SessionState,
    /// Most recent session id, kept after the session ends.
    pub session_id: Option<SessionId>,
    /// Whether tracking may start, as last reported by the attached screen.
    pub eligible: bool,
    /// Whether the renderer should follow live positions.
    pub following: bool,
    /// Failure that ended the most recent session, if any.
    pub last_error: Option<SessionError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SessionState; 4] = [
        SessionState::Idle,
        SessionState::Starting,
        SessionState::Active,
        SessionState::Stopping,
    ];

    #[test]
    fn test_idle_only_moves_to_starting() {
        for next in ALL {
            assert_eq!(
                SessionState::Idle.can_transition_to(next),
                next == SessionState::Starting,
                "Idle -> {}",
                next
            );
        }
    }

    #[test]
    fn test_stopping_only_moves_to_idle() {
        for next in ALL {
            assert_eq!(
                SessionState::Stopping.can_transition_to(next),
                next == SessionState::Idle,
                "Stopping -> {}",
                next
            );
        }
    }

    #[test]
    fn test_active_never_returns_to_starting() {
        assert!(!SessionState::Active.can_transition_to(SessionState::Starting));
        assert!(SessionState::Active.can_transition_to(SessionState::Stopping));
        assert!(SessionState::Active.can_transition_to(SessionState::Idle));
    }

    #[test]
    fn test_is_running() {
        assert!(!SessionState::Idle.is_running());
        assert!(SessionState::Starting.is_running());
        assert!(SessionState::Active.is_running());
        assert!(!SessionState::Stopping.is_running());
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId::new(42).to_string(), "#42");
    }
}
