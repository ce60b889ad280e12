//! Append-only path storage shared with the rendering collaborator.
//!
//! # Design
//!
//! - One writer (the tracking session) appends samples as they arrive
//! - Any number of readers take snapshots while appends continue
//! - A revision counter is published on every change so the renderer
//!   knows when to redraw
//!
//! Readers copy the path under a short read lock, so a snapshot is always a
//! consistent prefix of what has been appended. The writer never waits for a
//! renderer to finish drawing.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use tokio::sync::watch;

use super::Position;

/// Initial capacity reserved for a new path.
///
/// Covers roughly ten minutes of 1Hz sampling before the first reallocation.
const DEFAULT_CAPACITY: usize = 600;

/// Monotonic revision of the path contents.
///
/// Bumped on every append and every reset.
pub type PathRevision = u64;

#[derive(Debug)]
struct PathInner {
    positions: RwLock<Vec<Position>>,
    revision_tx: watch::Sender<PathRevision>,
}

/// Ordered, append-only sequence of positions for the current session.
///
/// Cloning is cheap and yields another handle to the same path.
///
/// # Usage
///
/// ```ignore
/// let path = PathAccumulator::new();
/// let mut revisions = path.subscribe();
///
/// path.append(Position::new(53.5, 10.0));
///
/// // Renderer side
/// revisions.changed().await?;
/// let points = path.snapshot();
/// ```
#[derive(Debug, Clone)]
pub struct PathAccumulator {
    inner: Arc<PathInner>,
}

impl Default for PathAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl PathAccumulator {
    /// Create an empty path.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an empty path with a capacity hint.
    pub fn with_capacity(capacity: usize) -> Self {
        let (revision_tx, _) = watch::channel(0);
        Self {
            inner: Arc::new(PathInner {
                positions: RwLock::new(Vec::with_capacity(capacity)),
                revision_tx,
            }),
        }
    }

    /// Append a position to the end of the path.
    pub fn append(&self, position: Position) {
        self.inner.positions.write().push(position);
        self.bump_revision();
    }

    /// Clear the path for a new session.
    pub fn reset(&self) {
        self.inner.positions.write().clear();
        self.bump_revision();
    }

    /// Copy of the path in insertion order.
    pub fn snapshot(&self) -> Vec<Position> {
        self.inner.positions.read().clone()
    }

    /// Number of positions recorded.
    pub fn len(&self) -> usize {
        self.inner.positions.read().len()
    }

    /// Whether no positions are recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.positions.read().is_empty()
    }

    /// The most recently appended position.
    pub fn latest(&self) -> Option<Position> {
        self.inner.positions.read().last().copied()
    }

    /// Time between the first and last recorded positions.
    pub fn time_span(&self) -> Option<ChronoDuration> {
        let positions = self.inner.positions.read();
        let first = positions.first()?;
        let last = positions.last()?;
        Some(last.timestamp - first.timestamp)
    }

    /// Current revision.
    pub fn revision(&self) -> PathRevision {
        *self.inner.revision_tx.borrow()
    }

    /// Subscribe to revision changes.
    ///
    /// The receiver only sees the latest revision; it is a redraw trigger,
    /// not a sample stream. Call [`snapshot`](Self::snapshot) after each change.
    pub fn subscribe(&self) -> watch::Receiver<PathRevision> {
        self.inner.revision_tx.subscribe()
    }

    fn bump_revision(&self) {
        self.inner.revision_tx.send_modify(|revision| *revision += 1);
    }
}
