//! Runtime location permission gate.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ReadinessAggregator;
use crate::BoxFuture;

/// Permission state for location access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationState {
    /// No request has completed yet.
    #[default]
    Unknown,
    /// The user refused. Terminal for the current appearance cycle.
    Denied,
    /// The user granted access.
    Granted,
}

/// Errors from issuing an authorization request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    /// A request was already issued during this appearance cycle.
    #[error("Authorization already requested in this cycle")]
    AlreadyRequested,

    /// The screen went away before the user answered.
    #[error("Authorization request cancelled")]
    Cancelled,
}

/// Permission-UI collaborator.
///
/// Implementations show the platform permission prompt and resolve with
/// `true` once the user grants location access. A prompt that cannot be shown
/// resolves with `false`.
pub trait PermissionRequester: Send + Sync {
    /// Ask the user for location permission.
    fn request_permission(&self) -> BoxFuture<'static, bool>;
}

#[derive(Debug)]
struct GateInner {
    state: AuthorizationState,
    requested_this_cycle: bool,
    cycle: CancellationToken,
}

/// Tracks whether location permission has been granted.
///
/// One request may be issued per appearance cycle. Results are pushed into
/// the [`ReadinessAggregator`].
pub struct AuthorizationGate {
    requester: Arc<dyn PermissionRequester>,
    aggregator: Arc<ReadinessAggregator>,
    inner: Mutex<GateInner>,
}

impl std::fmt::Debug for AuthorizationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationGate")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl AuthorizationGate {
    /// Create a gate that reports into `aggregator`.
    pub fn new(
        requester: Arc<dyn PermissionRequester>,
        aggregator: Arc<ReadinessAggregator>,
    ) -> Self {
        Self {
            requester,
            aggregator,
            inner: Mutex::new(GateInner {
                state: AuthorizationState::Unknown,
                requested_this_cycle: false,
                cycle: CancellationToken::new(),
            }),
        }
    }

    /// Current authorization state.
    pub fn state(&self) -> AuthorizationState {
        self.inner.lock().state
    }

    /// Open a new appearance cycle, allowing one more request.
    ///
    /// Any request still pending from the previous cycle is cancelled.
    pub fn begin_cycle(&self) {
        let mut inner = self.inner.lock();
        inner.cycle.cancel();
        inner.cycle = CancellationToken::new();
        inner.requested_this_cycle = false;
    }

    /// Abandon a pending request without opening a new cycle.
    pub fn cancel_pending(&self) {
        self.inner.lock().cycle.cancel();
    }

    /// Ask the permission collaborator for access and record the answer.
    ///
    /// Denial is not retried. The user has to re-trigger through the UI,
    /// which starts a new cycle.
    pub async fn request_authorization(&self) -> Result<AuthorizationState, AuthorizationError> {
        let cycle = {
            let mut inner = self.inner.lock();
            if inner.requested_this_cycle {
                return Err(AuthorizationError::AlreadyRequested);
            }
            inner.requested_this_cycle = true;
            inner.cycle.clone()
        };

        debug!("Requesting location permission");
        let granted = tokio::select! {
            granted = self.requester.request_permission() => granted,
            _ = cycle.cancelled() => {
                debug!("Permission request abandoned");
                return Err(AuthorizationError::Cancelled);
            }
        };

        let state = if granted {
            AuthorizationState::Granted
        } else {
            AuthorizationState::Denied
        };
        self.inner.lock().state = state;
        self.aggregator.set_authorization(state);

        info!(state = ?state, "Location permission resolved");
        Ok(state)
    }
}
