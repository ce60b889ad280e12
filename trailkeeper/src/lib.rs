//! Trailkeeper - Live location path tracking
//!
//! This library records the path of a moving device while a background
//! location process runs, and decides when that process may run at all.
//!
//! # Architecture
//!
//! ```text
//! TrackingScreen ─► ReadinessAggregator ─► TrackingSession ─► BackgroundService
//!   (permission,       (eligible = all       (Idle/Starting/      (positions,
//!    location,          three inputs)          Active/Stopping)     termination)
//!    surface)                                       │
//!                                                   ▼
//!                                            PathAccumulator ─► renderer
//! ```
//!
//! - [`readiness`] - permission, location-services and surface preconditions
//! - [`session`] - the tracking state machine and its async task
//! - [`service`] - the background location process and its lifecycle
//! - [`path`] - ordered, timestamped positions of the current session
//! - [`screen`] - per-appearance coordinator tying the above together

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod logging;
pub mod path;
pub mod readiness;
pub mod screen;
pub mod service;
pub mod session;
pub mod telemetry;

pub use config::{ConfigFile, SessionConfig, TrackerConfig};
pub use path::{PathAccumulator, Position};
pub use screen::{ScreenCapabilities, SettingsPrompt, TrackingScreen};
pub use session::{SessionError, SessionId, SessionState, TrackingSession, TrackingSessionHandle};

/// Boxed future returned by the dyn-compatible collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
