//! Rendering surface readiness.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::ReadinessAggregator;

/// Set once when the rendering surface finishes its first layout pass.
///
/// Monotonic for the lifetime of the value: once ready, always ready.
#[derive(Debug)]
pub struct SurfaceReadiness {
    ready: AtomicBool,
    aggregator: Arc<ReadinessAggregator>,
}

impl SurfaceReadiness {
    /// Create a not-yet-ready surface reporting into `aggregator`.
    pub fn new(aggregator: Arc<ReadinessAggregator>) -> Self {
        Self {
            ready: AtomicBool::new(false),
            aggregator,
        }
    }

    /// Mark the surface ready. Later calls are no-ops.
    ///
    /// Returns `true` only for the call that made the transition.
    pub fn mark_ready(&self) -> bool {
        if self.ready.swap(true, Ordering::AcqRel) {
            return false;
        }
        debug!("Rendering surface ready");
        self.aggregator.mark_surface_ready();
        true
    }

    /// Whether the surface is ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
