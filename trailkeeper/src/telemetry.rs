//! Session counters for observability.
//!
//! Lock-free atomic counters updated by the session task and read as a
//! point-in-time [`MetricsSnapshot`] by any observer.
//!
//! ```text
//! TrackingSession ─────► SessionMetrics ─────► MetricsSnapshot ─────► CLI / UI
//!                        (atomic counters)    (point-in-time copy)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing everything the session has done.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    sessions_started: AtomicU64,
    sessions_activated: AtomicU64,
    start_failures: AtomicU64,
    forced_stops: AtomicU64,
    unexpected_terminations: AtomicU64,
    samples_appended: AtomicU64,
    samples_discarded: AtomicU64,
}

/// Copy of [`SessionMetrics`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Accepted start commands.
    pub sessions_started: u64,
    /// Sessions that reached Active.
    pub sessions_activated: u64,
    /// Starts that failed or timed out.
    pub start_failures: u64,
    /// Stops forced by readiness loss.
    pub forced_stops: u64,
    /// Background processes that died while Active.
    pub unexpected_terminations: u64,
    /// Samples added to the path.
    pub samples_appended: u64,
    /// Samples received outside Active.
    pub samples_discarded: u64,
}

impl SessionMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn session_activated(&self) {
        self.sessions_activated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn start_failed(&self) {
        self.start_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn forced_stop(&self) {
        self.forced_stops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unexpected_termination(&self) {
        self.unexpected_terminations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sample_appended(&self) {
        self.samples_appended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sample_discarded(&self) {
        self.samples_discarded.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            sessions_activated: self.sessions_activated.load(Ordering::Relaxed),
            start_failures: self.start_failures.load(Ordering::Relaxed),
            forced_stops: self.forced_stops.load(Ordering::Relaxed),
            unexpected_terminations: self.unexpected_terminations.load(Ordering::Relaxed),
            samples_appended: self.samples_appended.load(Ordering::Relaxed),
            samples_discarded: self.samples_discarded.load(Ordering::Relaxed),
        }
    }
}
