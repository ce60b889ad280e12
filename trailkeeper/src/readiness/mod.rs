//! Preconditions that gate live tracking.
//!
//! Three independent leaf inputs feed one aggregator:
//!
//! ```text
//! AuthorizationGate ────┐
//! LocationAvailability ─┼──► ReadinessAggregator ──► ReadinessSubscription
//! SurfaceReadiness ─────┘    (eligible = all three)    (ordered, per consumer)
//! ```
//!
//! Each leaf pushes into the aggregator when its value changes; consumers
//! never register observers on the leaves themselves.

mod aggregator;
mod authorization;
mod location;
mod surface;

pub use aggregator::{ReadinessAggregator, ReadinessSignal, ReadinessSubscription};
pub use authorization::{
    AuthorizationError, AuthorizationGate, AuthorizationState, PermissionRequester,
};
pub use location::{LocationAvailability, LocationStatusProvider};
pub use surface::SurfaceReadiness;
