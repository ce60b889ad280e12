//! Tracked path storage.
//!
//! The tracking session appends every position sample it receives while a
//! session is active; the rendering collaborator reads snapshots to draw the
//! path overlay.
//!
//! ```text
//! Background service ──► TrackingSession ──► PathAccumulator ──► Renderer
//!   (position events)      (Active only)       (append/reset)     (snapshot)
//! ```

mod accumulator;
mod position;

pub use accumulator::{PathAccumulator, PathRevision};
pub use position::Position;
