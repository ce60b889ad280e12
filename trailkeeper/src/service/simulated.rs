//! In-process background service that fabricates a moving position.
//!
//! Stands in for the platform foreground service when running the CLI and
//! in integration tests. Each started session gets its own emitter task that
//! walks along a fixed bearing at a fixed speed until stopped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{BackgroundService, ServiceError, ServiceEvent, ServiceEvents};
use crate::path::Position;
use crate::session::SessionId;
use crate::BoxFuture;

/// Default channel capacity for emitted events.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;

/// Configuration for the simulated service.
#[derive(Debug, Clone)]
pub struct SimulatedServiceConfig {
    /// Latitude of the first sample.
    pub origin_latitude: f64,
    /// Longitude of the first sample.
    pub origin_longitude: f64,
    /// Direction of travel in degrees (0 = North).
    pub bearing_deg: f64,
    /// Ground speed in metres per second.
    pub speed_mps: f64,
    /// Time between samples.
    pub sample_interval: Duration,
    /// Delay before acknowledging a start.
    pub ack_delay: Duration,
    /// Reject every start.
    pub fail_start: bool,
    /// Event channel capacity.
    pub channel_capacity: usize,
}

impl Default for SimulatedServiceConfig {
    fn default() -> Self {
        Self {
            origin_latitude: 53.5511,
            origin_longitude: 9.9937,
            bearing_deg: 45.0,
            speed_mps: 1.4,
            sample_interval: Duration::from_secs(1),
            ack_delay: Duration::from_millis(50),
            fail_start: false,
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl SimulatedServiceConfig {
    /// Set the sample interval.
    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    /// Set the acknowledgment delay.
    pub fn with_ack_delay(mut self, delay: Duration) -> Self {
        self.ack_delay = delay;
        self
    }

    /// Make every start fail.
    pub fn with_fail_start(mut self, fail: bool) -> Self {
        self.fail_start = fail;
        self
    }
}

/// Control tokens for one running emitter.
#[derive(Debug)]
struct Emitter {
    stop: CancellationToken,
    crash: CancellationToken,
}

#[derive(Debug, Default)]
struct SimulatedInner {
    running: Mutex<HashMap<SessionId, Emitter>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

/// Fake background location process.
#[derive(Debug, Clone)]
pub struct SimulatedLocationService {
    config: SimulatedServiceConfig,
    inner: Arc<SimulatedInner>,
}

impl Default for SimulatedLocationService {
    fn default() -> Self {
        Self::new(SimulatedServiceConfig::default())
    }
}

impl SimulatedLocationService {
    /// Create a service with the given configuration.
    pub fn new(config: SimulatedServiceConfig) -> Self {
        Self {
            config,
            inner: Arc::new(SimulatedInner::default()),
        }
    }

    /// Whether an emitter is running for `session`.
    pub fn is_running(&self, session: SessionId) -> bool {
        self.inner.running.lock().contains_key(&session)
    }

    /// Number of running emitters.
    pub fn running_count(&self) -> usize {
        self.inner.running.lock().len()
    }

    /// Number of start commands received.
    pub fn start_count(&self) -> usize {
        self.inner.starts.load(Ordering::SeqCst)
    }

    /// Number of stop commands received.
    pub fn stop_count(&self) -> usize {
        self.inner.stops.load(Ordering::SeqCst)
    }

    /// Kill the emitter for `session` as if the platform reclaimed it.
    ///
    /// The session sees a [`ServiceEvent::Terminated`]. Returns `false` if
    /// nothing was running.
    pub fn terminate(&self, session: SessionId) -> bool {
        match self.inner.running.lock().remove(&session) {
            Some(emitter) => {
                emitter.crash.cancel();
                true
            }
            None => false,
        }
    }
}

impl BackgroundService for SimulatedLocationService {
    fn start(&self, session: SessionId) -> BoxFuture<'static, Result<ServiceEvents, ServiceError>> {
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        let config = self.config.clone();
        let inner = Arc::clone(&self.inner);

        Box::pin(async move {
            tokio::time::sleep(config.ack_delay).await;

            if config.fail_start {
                return Err(ServiceError::StartRejected(
                    "simulated start failure".to_string(),
                ));
            }

            let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
            let emitter = Emitter {
                stop: CancellationToken::new(),
                crash: CancellationToken::new(),
            };
            let stop = emitter.stop.clone();
            let crash = emitter.crash.clone();

            if let Some(previous) = inner.running.lock().insert(session, emitter) {
                previous.stop.cancel();
            }

            tokio::spawn(run_emitter(config, session, tx, stop, crash));
            info!(session_id = %session, "Simulated location service started");
            Ok(rx)
        })
    }

    fn stop(&self, session: SessionId) -> BoxFuture<'static, ()> {
        self.inner.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(emitter) = self.inner.running.lock().remove(&session) {
            emitter.stop.cancel();
        }
        Box::pin(async move {
            debug!(session_id = %session, "Simulated location service stopped");
        })
    }
}

async fn run_emitter(
    config: SimulatedServiceConfig,
    session: SessionId,
    tx: mpsc::Sender<ServiceEvent>,
    stop: CancellationToken,
    crash: CancellationToken,
) {
    let step_m = config.speed_mps * config.sample_interval.as_secs_f64();
    let mut position = Position::new(config.origin_latitude, config.origin_longitude);
    let mut ticker = tokio::time::interval(config.sample_interval);

    loop {
        tokio::select! {
            biased;

            _ = stop.cancelled() => break,

            _ = crash.cancelled() => {
                let _ = tx
                    .send(ServiceEvent::Terminated {
                        reason: "simulated process death".to_string(),
                    })
                    .await;
                break;
            }

            _ = ticker.tick() => {
                if tx.send(ServiceEvent::Position(position)).await.is_err() {
                    break;
                }
                position = position.offset(config.bearing_deg, step_m, Utc::now());
            }
        }
    }

    debug!(session_id = %session, "Simulated emitter exited");
}
