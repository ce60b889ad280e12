//! Background location service boundary.
//!
//! The tracking session never talks to the platform directly. It drives a
//! [`BackgroundService`] through [`BackgroundServiceLifecycle`], which turns
//! missing acknowledgments into timeouts so no command can hang forever.
//!
//! # Example
//!
//! ```ignore
//! use trailkeeper::service::{BackgroundServiceLifecycle, SimulatedLocationService};
//!
//! let service = Arc::new(SimulatedLocationService::default());
//! let lifecycle = BackgroundServiceLifecycle::new(service, &SessionConfig::default());
//!
//! let mut events = lifecycle.start(session_id).await?;
//! while let Some(event) = events.recv().await {
//!     // ServiceEvent::Position / ServiceEvent::Terminated
//! }
//! lifecycle.stop(session_id).await;
//! ```

mod lifecycle;
mod simulated;
mod traits;

pub use lifecycle::{BackgroundServiceLifecycle, StopOutcome};
pub use simulated::{SimulatedLocationService, SimulatedServiceConfig};
pub use traits::{BackgroundService, ServiceError, ServiceEvent, ServiceEvents};
