//! The tracking session task.
//!
//! [`TrackingSession`] owns one long-lived tokio task that holds all session
//! state. Everything reaches it as a message, and it handles them one at a
//! time:
//!
//! ```text
//!                  ┌──────────────────────────────────────────┐
//!  Handle ───────► │ commands   (start/stop/attach/foreground)│
//!  Aggregator ───► │ readiness  (ordered eligibility changes) │ ──► watch<SessionSnapshot>
//!  Service ──────► │ events     (positions, termination)      │ ──► PathAccumulator
//!  Own spawns ───► │ internal   (start/stop acks, follow timer)│
//!                  └──────────────────────────────────────────┘
//! ```
//!
//! Background start and stop calls run in spawned tasks and report back
//! through the internal channel, so the session keeps reacting to stop
//! commands and readiness loss while an acknowledgment is pending.
//!
//! # Example
//!
//! ```ignore
//! let session = TrackingSession::spawn(service, SessionConfig::default());
//! let handle = session.handle();
//!
//! handle.attach_readiness(aggregator.subscribe())?;
//! let id = handle.start().await?;
//! handle.wait_for(|s| s.state == SessionState::Active).await?;
//!
//! let points = handle.path().snapshot();
//! handle.stop().await?;
//! session.shutdown().await;
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    SessionCommand, SessionError, SessionId, SessionSnapshot, SessionState, StopReason,
};
use crate::config::SessionConfig;
use crate::path::PathAccumulator;
use crate::readiness::{ReadinessSignal, ReadinessSubscription};
use crate::service::{
    BackgroundService, BackgroundServiceLifecycle, ServiceError, ServiceEvent, ServiceEvents,
    StopOutcome,
};
use crate::telemetry::{MetricsSnapshot, SessionMetrics};

// =============================================================================
// Messages
// =============================================================================

/// Commands sent from handles.
enum Command {
    Start {
        reply: oneshot::Sender<Result<SessionId, SessionError>>,
    },
    Stop {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    AttachReadiness(ReadinessSubscription),
    DetachReadiness,
    SetForeground(bool),
}

/// Results of work the session spawned itself.
enum Internal {
    StartResolved {
        session: SessionId,
        result: Result<ServiceEvents, ServiceError>,
    },
    StopResolved {
        session: SessionId,
        outcome: StopOutcome,
    },
    FollowDelayElapsed {
        session: SessionId,
        generation: u64,
    },
}

// =============================================================================
// Public API
// =============================================================================

/// Owner of the tracking session task.
///
/// Dropping a [`TrackingSessionHandle`] never stops tracking; only
/// [`stop`](TrackingSessionHandle::stop), loss of readiness, or
/// [`shutdown`](Self::shutdown) do.
pub struct TrackingSession {
    handle: TrackingSessionHandle,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl TrackingSession {
    /// Spawn the session task on the current tokio runtime.
    pub fn spawn(service: Arc<dyn BackgroundService>, config: SessionConfig) -> Self {
        let path = PathAccumulator::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let metrics = Arc::new(SessionMetrics::new());
        let shutdown = CancellationToken::new();

        let task = SessionTask {
            lifecycle: BackgroundServiceLifecycle::new(service, &config),
            config,
            path: path.clone(),
            metrics: Arc::clone(&metrics),
            snapshot_tx,
            internal_tx,
            state: SessionState::Idle,
            session: None,
            next_session: 1,
            eligible: false,
            readiness: None,
            events: None,
            foreground: true,
            following: false,
            follow_timer: None,
            follow_generation: 0,
            last_error: None,
        };

        let task = tokio::spawn(task.run(command_rx, internal_rx, shutdown.clone()));

        Self {
            handle: TrackingSessionHandle {
                commands: command_tx,
                snapshot_rx,
                path,
                metrics,
            },
            shutdown,
            task,
        }
    }

    /// A handle for issuing commands.
    pub fn handle(&self) -> TrackingSessionHandle {
        self.handle.clone()
    }

    /// Stop any running session and end the task.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Tracking session task failed");
        }
    }
}

/// Cloneable command interface to a [`TrackingSession`].
#[derive(Clone)]
pub struct TrackingSessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    path: PathAccumulator,
    metrics: Arc<SessionMetrics>,
}

impl std::fmt::Debug for TrackingSessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingSessionHandle")
            .field("snapshot", &*self.snapshot_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl TrackingSessionHandle {
    /// Request Idle -> Starting.
    ///
    /// Resolves once the command is accepted or rejected; the move to
    /// Active happens when the background service acknowledges.
    pub async fn start(&self) -> Result<SessionId, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { reply })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Request Starting/Active -> Stopping.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Stop { reply })?;
        rx.await.map_err(|_| SessionError::Closed)?
    }

    /// Feed readiness changes from a screen's aggregator into the session.
    ///
    /// Replaces any previously attached subscription.
    pub fn attach_readiness(&self, subscription: ReadinessSubscription) -> Result<(), SessionError> {
        self.send(Command::AttachReadiness(subscription))
    }

    /// Drop the readiness subscription without touching a running session.
    pub fn detach_readiness(&self) -> Result<(), SessionError> {
        self.send(Command::DetachReadiness)
    }

    /// Report whether the screen is in the foreground.
    ///
    /// Following live positions only happens in the foreground.
    pub fn set_foreground(&self, foreground: bool) -> Result<(), SessionError> {
        self.send(Command::SetForeground(foreground))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.snapshot_rx.borrow().state
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Wait until a snapshot satisfies `predicate`.
    pub async fn wait_for(
        &self,
        mut predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|snapshot| predicate(snapshot))
            .await
            .map_err(|_| SessionError::Closed)?;
        Ok(snapshot.clone())
    }

    /// The recorded path.
    pub fn path(&self) -> PathAccumulator {
        self.path.clone()
    }

    /// Session counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }
}

// =============================================================================
// Session Task
// =============================================================================

struct SessionTask {
    lifecycle: BackgroundServiceLifecycle,
    config: SessionConfig,
    path: PathAccumulator,
    metrics: Arc<SessionMetrics>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    internal_tx: mpsc::UnboundedSender<Internal>,

    state: SessionState,
    session: Option<SessionId>,
    next_session: u64,
    eligible: bool,
    readiness: Option<ReadinessSubscription>,
    events: Option<ServiceEvents>,
    foreground: bool,
    following: bool,
    follow_timer: Option<CancellationToken>,
    follow_generation: u64,
    last_error: Option<SessionError>,
}

impl SessionTask {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal>,
        shutdown: CancellationToken,
    ) {
        info!("Tracking session task started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                Some(message) = internal.recv() => self.handle_internal(message),

                signal = next_readiness(&mut self.readiness) => self.handle_readiness(signal),

                event = next_event(&mut self.events) => self.handle_service_event(event),

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }

        self.wind_down().await;
        info!("Tracking session task stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { reply } => {
                let result = self.start();
                let _ = reply.send(result);
            }
            Command::Stop { reply } => {
                let result = self.stop(StopReason::Requested);
                let _ = reply.send(result);
            }
            Command::AttachReadiness(subscription) => {
                let initial = subscription.initial();
                self.eligible = initial.eligible();
                self.readiness = Some(subscription);
                debug!(eligible = self.eligible, "Readiness attached");

                if initial.blocked() && self.state.is_running() {
                    self.force_stop("Attached readiness is blocked, stopping tracking");
                } else {
                    self.publish();
                }
            }
            Command::DetachReadiness => self.detach_readiness(),
            Command::SetForeground(foreground) => self.set_foreground(foreground),
        }
    }

    fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::StartResolved { session, result } => self.on_start_resolved(session, result),
            Internal::StopResolved { session, outcome } => self.on_stop_resolved(session, outcome),
            Internal::FollowDelayElapsed {
                session,
                generation,
            } => self.on_follow_delay_elapsed(session, generation),
        }
    }

    // -------------------------------------------------------------------------
    // Start / stop
    // -------------------------------------------------------------------------

    fn start(&mut self) -> Result<SessionId, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                command: SessionCommand::Start,
            });
        }
        if !self.eligible {
            debug!("Start ignored: tracking not eligible");
            return Err(SessionError::NotEligible);
        }

        let session = SessionId::new(self.next_session);
        self.next_session += 1;
        self.session = Some(session);
        self.last_error = None;
        self.path.reset();
        self.metrics.session_started();
        self.transition(SessionState::Starting, "start requested");

        let lifecycle = self.lifecycle.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = lifecycle.start(session).await;
            if let Err(mpsc::error::SendError(Internal::StartResolved { result: Ok(_), .. })) =
                internal_tx.send(Internal::StartResolved { session, result })
            {
                // Session task is gone; nobody will ever stop this process.
                lifecycle.stop(session).await;
            }
        });

        Ok(session)
    }

    fn stop(&mut self, reason: StopReason) -> Result<(), SessionError> {
        let session = match (self.state, self.session) {
            (SessionState::Starting | SessionState::Active, Some(session)) => session,
            (from, _) => {
                return Err(SessionError::InvalidTransition {
                    from,
                    command: SessionCommand::Stop,
                })
            }
        };

        self.events = None;
        self.cancel_follow();
        self.transition(SessionState::Stopping, reason);

        let lifecycle = self.lifecycle.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = lifecycle.stop(session).await;
            let _ = internal_tx.send(Internal::StopResolved { session, outcome });
        });

        Ok(())
    }

    fn on_start_resolved(&mut self, session: SessionId, result: Result<ServiceEvents, ServiceError>) {
        let current = self.state == SessionState::Starting && self.session == Some(session);

        if !current {
            debug!(session_id = %session, state = %self.state, "Ignoring stale start acknowledgment");
            if result.is_ok() {
                // The process came up after we gave up on it.
                let lifecycle = self.lifecycle.clone();
                tokio::spawn(async move {
                    lifecycle.stop(session).await;
                });
            }
            return;
        }

        match result {
            Ok(events) => {
                self.events = Some(events);
                self.metrics.session_activated();
                self.transition(SessionState::Active, "start acknowledged");
                self.arm_follow_timer();
            }
            Err(e) => {
                self.metrics.start_failed();
                self.last_error = Some(SessionError::BackgroundStartFailure(e));
                self.transition(SessionState::Idle, "start failed");
            }
        }
    }

    fn on_stop_resolved(&mut self, session: SessionId, outcome: StopOutcome) {
        if self.state != SessionState::Stopping || self.session != Some(session) {
            debug!(session_id = %session, "Ignoring stale stop acknowledgment");
            return;
        }
        let reason = match outcome {
            StopOutcome::Acknowledged => "stop acknowledged",
            StopOutcome::TimedOut => "stop timed out",
        };
        self.transition(SessionState::Idle, reason);
    }

    // -------------------------------------------------------------------------
    // Readiness
    // -------------------------------------------------------------------------

    fn handle_readiness(&mut self, signal: Option<ReadinessSignal>) {
        let Some(signal) = signal else {
            debug!("Readiness source closed");
            self.detach_readiness();
            return;
        };

        let was_eligible = self.eligible;
        self.eligible = signal.eligible();
        trace!(
            eligible = self.eligible,
            authorization = ?signal.authorization,
            location_enabled = signal.location_enabled,
            surface_ready = signal.surface_ready,
            "Readiness notification"
        );

        // A screen attached mid-session was never eligible, so an explicit
        // negative from it has to count as loss too.
        let lost = (was_eligible && !self.eligible) || signal.blocked();
        if lost && self.state.is_running() {
            self.force_stop("Readiness lost, stopping tracking");
        } else {
            self.publish();
        }
    }

    fn force_stop(&mut self, message: &str) {
        warn!(
            session_id = ?self.session,
            state = %self.state,
            "{}",
            message
        );
        self.metrics.forced_stop();
        if let Err(e) = self.stop(StopReason::IneligibleReadiness) {
            warn!(error = %e, "Forced stop rejected");
        }
    }

    fn detach_readiness(&mut self) {
        self.readiness = None;
        self.eligible = false;
        debug!(state = %self.state, "Readiness detached");
        self.publish();
    }

    // -------------------------------------------------------------------------
    // Service events
    // -------------------------------------------------------------------------

    fn handle_service_event(&mut self, event: Option<ServiceEvent>) {
        match event {
            Some(ServiceEvent::Position(position)) => {
                if self.state == SessionState::Active {
                    self.path.append(position);
                    self.metrics.sample_appended();
                    trace!(position = %position, "Position appended");
                } else {
                    self.metrics.sample_discarded();
                }
            }
            Some(ServiceEvent::Terminated { reason }) => self.on_unexpected_termination(reason),
            None => self.on_unexpected_termination("event stream closed".to_string()),
        }
    }

    fn on_unexpected_termination(&mut self, reason: String) {
        self.events = None;
        if self.state != SessionState::Active {
            return;
        }

        warn!(session_id = ?self.session, reason = %reason, "Background process terminated");
        self.metrics.unexpected_termination();
        self.cancel_follow();
        self.last_error = Some(SessionError::UnexpectedTermination { reason });
        self.transition(SessionState::Idle, "process terminated");
    }

    // -------------------------------------------------------------------------
    // Follow-location timer
    // -------------------------------------------------------------------------

    fn set_foreground(&mut self, foreground: bool) {
        if self.foreground == foreground {
            return;
        }
        self.foreground = foreground;
        debug!(foreground, "Foreground changed");

        if foreground {
            self.arm_follow_timer();
        } else {
            self.cancel_follow();
        }
        self.publish();
    }

    fn arm_follow_timer(&mut self) {
        self.cancel_follow();

        let Some(session) = self.session else {
            return;
        };
        if self.state != SessionState::Active || !self.foreground {
            return;
        }

        self.follow_generation += 1;
        let generation = self.follow_generation;
        let token = CancellationToken::new();
        self.follow_timer = Some(token.clone());

        let delay = self.config.follow_delay;
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = internal_tx.send(Internal::FollowDelayElapsed { session, generation });
                }
            }
        });
        debug!(session_id = %session, delay_ms = delay.as_millis() as u64, "Follow timer armed");
    }

    fn cancel_follow(&mut self) {
        if let Some(token) = self.follow_timer.take() {
            token.cancel();
        }
        if self.following {
            self.following = false;
            debug!("Following disabled");
        }
    }

    fn on_follow_delay_elapsed(&mut self, session: SessionId, generation: u64) {
        let armed = self.follow_timer.is_some() && generation == self.follow_generation;
        if !armed || self.state != SessionState::Active || self.session != Some(session) {
            return;
        }

        self.follow_timer = None;
        self.following = true;
        debug!(session_id = %session, "Following live position");
        self.publish();
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    fn transition(&mut self, next: SessionState, reason: impl std::fmt::Display) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(next),
            "illegal session transition {} -> {}",
            from,
            next
        );

        self.state = next;
        info!(
            session_id = ?self.session.map(|s| s.get()),
            from = %from,
            to = %next,
            reason = %reason,
            "Session transition"
        );
        self.publish();
    }

    fn publish(&self) {
        let snapshot = SessionSnapshot {
            state: self.state,
            session_id: self.session,
            eligible: self.eligible,
            following: self.following,
            last_error: self.last_error.clone(),
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    async fn wind_down(&mut self) {
        self.cancel_follow();
        self.events = None;
        self.readiness = None;

        let Some(session) = self.session else {
            return;
        };
        if self.state == SessionState::Idle {
            return;
        }

        if self.state.is_running() {
            self.transition(SessionState::Stopping, StopReason::Shutdown);
        }
        // A stop may already be in flight; a second one is harmless.
        self.lifecycle.stop(session).await;
        self.transition(SessionState::Idle, "shutdown complete");
    }
}

async fn next_readiness(readiness: &mut Option<ReadinessSubscription>) -> Option<ReadinessSignal> {
    match readiness {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_event(events: &mut Option<ServiceEvents>) -> Option<ServiceEvent> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}
