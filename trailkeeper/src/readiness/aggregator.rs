//! Combines the three readiness inputs into one tracking-eligibility signal.
//!
//! The aggregator owns the authorization, location, and surface inputs in a
//! single place. Every input change recomputes the signal and pushes it to
//! each subscriber over its own unbounded channel, so notifications arrive
//! in the order the inputs changed and are never coalesced.

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use super::AuthorizationState;

/// Snapshot of all readiness inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessSignal {
    /// Runtime permission state.
    pub authorization: AuthorizationState,
    /// Whether the device location subsystem was enabled at the last poll.
    pub location_enabled: bool,
    /// Whether location has been polled at least once.
    pub location_checked: bool,
    /// Whether the rendering surface has finished its first layout.
    pub surface_ready: bool,
}

impl Default for ReadinessSignal {
    fn default() -> Self {
        Self {
            authorization: AuthorizationState::Unknown,
            location_enabled: false,
            location_checked: false,
            surface_ready: false,
        }
    }
}

impl ReadinessSignal {
    /// Whether tracking may start.
    pub fn eligible(&self) -> bool {
        self.authorization == AuthorizationState::Granted
            && self.location_enabled
            && self.surface_ready
    }

    /// Whether an input is known to be negative, not just still pending.
    ///
    /// Permission denied, or location reported off by an actual poll. An
    /// unanswered permission request or a surface still laying out is not
    /// a block.
    pub fn blocked(&self) -> bool {
        self.authorization == AuthorizationState::Denied
            || (self.location_checked && !self.location_enabled)
    }
}

/// Ordered stream of readiness changes for one consumer.
#[derive(Debug)]
pub struct ReadinessSubscription {
    initial: ReadinessSignal,
    rx: mpsc::UnboundedReceiver<ReadinessSignal>,
}

impl ReadinessSubscription {
    /// Signal value at the moment of subscribing.
    pub fn initial(&self) -> ReadinessSignal {
        self.initial
    }

    /// Wait for the next change.
    ///
    /// Returns `None` once the aggregator has been dropped.
    pub async fn recv(&mut self) -> Option<ReadinessSignal> {
        self.rx.recv().await
    }

    /// Take the next change if one is already queued.
    pub fn try_recv(&mut self) -> Option<ReadinessSignal> {
        self.rx.try_recv().ok()
    }
}

#[derive(Debug, Default)]
struct AggregatorInner {
    signal: ReadinessSignal,
    subscribers: Vec<mpsc::UnboundedSender<ReadinessSignal>>,
}

/// Single owner of the readiness inputs.
#[derive(Debug, Default)]
pub struct ReadinessAggregator {
    inner: Mutex<AggregatorInner>,
}

impl ReadinessAggregator {
    /// Create an aggregator with every input unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current signal.
    pub fn signal(&self) -> ReadinessSignal {
        self.inner.lock().signal
    }

    /// Whether tracking may start right now.
    pub fn is_eligible(&self) -> bool {
        self.signal().eligible()
    }

    /// Record an authorization result.
    ///
    /// Returns `true` if the input changed and subscribers were notified.
    pub fn set_authorization(&self, state: AuthorizationState) -> bool {
        self.update(|signal| signal.authorization = state)
    }

    /// Record a location availability poll.
    pub fn set_location_enabled(&self, enabled: bool) -> bool {
        self.update(|signal| {
            signal.location_enabled = enabled;
            signal.location_checked = true;
        })
    }

    /// Record that the rendering surface is ready. The input never reverts.
    pub fn mark_surface_ready(&self) -> bool {
        self.update(|signal| signal.surface_ready = true)
    }

    /// Subscribe to ordered readiness changes.
    pub fn subscribe(&self) -> ReadinessSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.subscribers.push(tx);
        ReadinessSubscription {
            initial: inner.signal,
            rx,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.subscribers.retain(|tx| !tx.is_closed());
        inner.subscribers.len()
    }

    fn update(&self, apply: impl FnOnce(&mut ReadinessSignal)) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.signal;
        apply(&mut inner.signal);
        let after = inner.signal;

        if before == after {
            return false;
        }

        debug!(
            authorization = ?after.authorization,
            location_enabled = after.location_enabled,
            surface_ready = after.surface_ready,
            eligible = after.eligible(),
            "Readiness changed"
        );

        // Publish under the lock so concurrent setters cannot reorder.
        inner.subscribers.retain(|tx| tx.send(after).is_ok());
        true
    }
}
