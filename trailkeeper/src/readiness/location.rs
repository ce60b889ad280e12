//! Device location availability.

use std::sync::Arc;

use tracing::debug;

use super::ReadinessAggregator;

/// Reads the platform's location-service status flag.
pub trait LocationStatusProvider: Send + Sync {
    /// Whether location services are enabled right now.
    fn is_location_enabled(&self) -> bool;
}

/// Point-in-time check of whether the device can provide locations.
///
/// This only reports. Enabling location is left to the user through the
/// settings prompt collaborator.
pub struct LocationAvailability {
    provider: Arc<dyn LocationStatusProvider>,
    aggregator: Arc<ReadinessAggregator>,
}

impl std::fmt::Debug for LocationAvailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationAvailability").finish_non_exhaustive()
    }
}

impl LocationAvailability {
    /// Create a checker that reports into `aggregator`.
    pub fn new(
        provider: Arc<dyn LocationStatusProvider>,
        aggregator: Arc<ReadinessAggregator>,
    ) -> Self {
        Self {
            provider,
            aggregator,
        }
    }

    /// Poll the platform without publishing.
    pub fn is_enabled(&self) -> bool {
        self.provider.is_location_enabled()
    }

    /// Poll the platform and publish the result to the aggregator.
    pub fn poll(&self) -> bool {
        let enabled = self.is_enabled();
        if self.aggregator.set_location_enabled(enabled) {
            debug!(enabled, "Location availability changed");
        }
        enabled
    }
}
