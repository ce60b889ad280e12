//! Integration tests for the tracking session.
//!
//! These tests drive the public API end to end:
//! - Readiness gating through a tracking screen
//! - Session lifecycle against the simulated background service
//! - Path reset policy across restarts
//! - Screen teardown and re-creation while tracking continues
//!
//! Run with: `cargo test --test tracking_session_integration`

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trailkeeper::readiness::{
    AuthorizationState, LocationStatusProvider, PermissionRequester, ReadinessAggregator,
};
use trailkeeper::service::{
    BackgroundService, ServiceError, ServiceEvents, SimulatedLocationService,
    SimulatedServiceConfig,
};
use trailkeeper::session::SessionSnapshot;
use trailkeeper::{
    BoxFuture, ScreenCapabilities, SessionConfig, SessionError, SessionId, SessionState,
    SettingsPrompt, TrackingScreen, TrackingSession, TrackingSessionHandle,
};

// ============================================================================
// Helper Functions
// ============================================================================

const WAIT: Duration = Duration::from_secs(3);

struct GrantingPermissions;

impl PermissionRequester for GrantingPermissions {
    fn request_permission(&self) -> BoxFuture<'static, bool> {
        Box::pin(async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            true
        })
    }
}

struct LocationSwitch(AtomicBool);

impl LocationSwitch {
    fn new(enabled: bool) -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(enabled)))
    }

    fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl LocationStatusProvider for LocationSwitch {
    fn is_location_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingPrompt {
    prompts: AtomicUsize,
}

impl SettingsPrompt for RecordingPrompt {
    fn prompt_enable_location(&self) {
        self.prompts.fetch_add(1, Ordering::SeqCst);
    }
}

/// Background service that never acknowledges a start.
#[derive(Default)]
struct SilentService {
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl BackgroundService for SilentService {
    fn start(&self, _session: SessionId) -> BoxFuture<'static, Result<ServiceEvents, ServiceError>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Box::pin(std::future::pending())
    }

    fn stop(&self, _session: SessionId) -> BoxFuture<'static, ()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

fn fast_service() -> SimulatedLocationService {
    SimulatedLocationService::new(
        SimulatedServiceConfig::default()
            .with_sample_interval(Duration::from_millis(5))
            .with_ack_delay(Duration::from_millis(10)),
    )
}

fn fast_config() -> SessionConfig {
    SessionConfig::default().with_follow_delay(Duration::from_millis(20))
}

fn spawn_session(service: &SimulatedLocationService) -> TrackingSession {
    TrackingSession::spawn(
        Arc::new(service.clone()) as Arc<dyn BackgroundService>,
        fast_config(),
    )
}

fn ready_aggregator() -> ReadinessAggregator {
    let aggregator = ReadinessAggregator::new();
    aggregator.set_authorization(AuthorizationState::Granted);
    aggregator.set_location_enabled(true);
    aggregator.mark_surface_ready();
    aggregator
}

fn screen_for(
    handle: TrackingSessionHandle,
    location: &Arc<LocationSwitch>,
    prompt: &Arc<RecordingPrompt>,
) -> TrackingScreen {
    TrackingScreen::new(
        ScreenCapabilities {
            permissions: Arc::new(GrantingPermissions),
            location: Arc::clone(location) as Arc<dyn LocationStatusProvider>,
            settings: Arc::clone(prompt) as Arc<dyn SettingsPrompt>,
        },
        handle,
    )
}

async fn wait_state(handle: &TrackingSessionHandle, state: SessionState) -> SessionSnapshot {
    tokio::time::timeout(WAIT, handle.wait_for(|s| s.state == state))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", state))
        .unwrap()
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition never became true");
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Location off at creation, enabled from settings, picked up on resume.
#[tokio::test]
async fn test_enabling_location_from_settings_allows_start() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let location = LocationSwitch::new(false);
    let prompt = Arc::new(RecordingPrompt::default());
    let mut screen = screen_for(handle.clone(), &location, &prompt);

    screen.on_create().unwrap();
    screen.on_surface_ready();
    wait_until(|| screen.authorization_state() == AuthorizationState::Granted).await;

    assert_eq!(prompt.prompts.load(Ordering::SeqCst), 1);
    assert!(!screen.start_enabled());
    assert_eq!(screen.start_tracking().await, Err(SessionError::NotEligible));

    // User flips location on in system settings and returns
    location.set(true);
    screen.on_resume().unwrap();
    assert!(screen.start_enabled());
    tokio::time::timeout(WAIT, handle.wait_for(|s| s.eligible))
        .await
        .unwrap()
        .unwrap();

    let id = screen.start_tracking().await.unwrap();
    assert_eq!(handle.state(), SessionState::Starting);

    let snapshot = wait_state(&handle, SessionState::Active).await;
    assert_eq!(snapshot.session_id, Some(id));
    assert!(service.is_running(id));

    drop(screen);
    session.shutdown().await;
    assert!(!service.is_running(id));
}

/// Start while ineligible never reaches the background service.
#[tokio::test]
async fn test_start_without_readiness_never_starts_service() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();

    let aggregator = ReadinessAggregator::new();
    aggregator.set_authorization(AuthorizationState::Granted);
    aggregator.mark_surface_ready();
    handle.attach_readiness(aggregator.subscribe()).unwrap();

    for _ in 0..3 {
        assert_eq!(handle.start().await, Err(SessionError::NotEligible));
    }
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(handle.state(), SessionState::Idle);
    assert_eq!(service.start_count(), 0);
    assert_eq!(handle.metrics().sessions_started, 0);

    session.shutdown().await;
}

/// Losing location while Active stops the service exactly once.
#[tokio::test]
async fn test_location_loss_stops_active_session_once() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let aggregator = ready_aggregator();
    handle.attach_readiness(aggregator.subscribe()).unwrap();

    let id = handle.start().await.unwrap();
    wait_state(&handle, SessionState::Active).await;

    aggregator.set_location_enabled(false);
    // Repeated negative signals must not produce further stops
    aggregator.set_location_enabled(false);

    wait_state(&handle, SessionState::Idle).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(service.stop_count(), 1);
    assert!(!service.is_running(id));
    assert_eq!(handle.metrics().forced_stops, 1);

    session.shutdown().await;
    assert_eq!(service.stop_count(), 1);
}

/// Positions arrive in production order and stop with the session.
#[tokio::test]
async fn test_path_preserves_sample_order() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let aggregator = ready_aggregator();
    handle.attach_readiness(aggregator.subscribe()).unwrap();

    handle.start().await.unwrap();
    wait_state(&handle, SessionState::Active).await;

    let path = handle.path();
    wait_until(|| path.len() >= 10).await;
    handle.stop().await.unwrap();
    wait_state(&handle, SessionState::Idle).await;

    let points = path.snapshot();
    assert!(points.len() >= 10);
    for pair in points.windows(2) {
        assert!(pair[1].timestamp >= pair[0].timestamp);
        // Simulated walk heads north-east
        assert!(pair[1].latitude > pair[0].latitude);
    }

    let settled = path.len();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(path.len(), settled);

    session.shutdown().await;
}

/// The path is kept after stop and cleared by the next start.
#[tokio::test]
async fn test_restart_clears_previous_path() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let aggregator = ready_aggregator();
    handle.attach_readiness(aggregator.subscribe()).unwrap();
    let path = handle.path();

    handle.start().await.unwrap();
    wait_state(&handle, SessionState::Active).await;
    wait_until(|| path.len() >= 3).await;
    handle.stop().await.unwrap();
    wait_state(&handle, SessionState::Idle).await;

    let first_run = path.snapshot();
    assert!(first_run.len() >= 3);
    let first_run_end = first_run.last().unwrap().timestamp;

    let second = handle.start().await.unwrap();
    assert_eq!(second, SessionId::new(2));

    wait_state(&handle, SessionState::Active).await;
    wait_until(|| !path.is_empty()).await;
    assert!(path.snapshot()[0].timestamp > first_run_end);

    session.shutdown().await;
}

/// Platform kills the process: session ends with an error, path survives.
#[tokio::test]
async fn test_process_death_keeps_path() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let aggregator = ready_aggregator();
    handle.attach_readiness(aggregator.subscribe()).unwrap();

    let id = handle.start().await.unwrap();
    wait_state(&handle, SessionState::Active).await;
    let path = handle.path();
    wait_until(|| path.len() >= 2).await;

    assert!(service.terminate(id));
    let snapshot = wait_state(&handle, SessionState::Idle).await;

    assert!(matches!(
        snapshot.last_error,
        Some(SessionError::UnexpectedTermination { .. })
    ));
    assert!(path.len() >= 2);
    assert_eq!(handle.metrics().unexpected_terminations, 1);

    // A fresh start is allowed and clears the error
    handle.start().await.unwrap();
    let snapshot = wait_state(&handle, SessionState::Active).await;
    assert_eq!(snapshot.last_error, None);

    session.shutdown().await;
}

/// A start that is never acknowledged falls back to Idle.
#[tokio::test]
async fn test_unacknowledged_start_times_out() {
    let service = Arc::new(SilentService::default());
    let session = TrackingSession::spawn(
        Arc::clone(&service) as Arc<dyn BackgroundService>,
        fast_config().with_start_timeout(Duration::from_millis(50)),
    );
    let handle = session.handle();
    let aggregator = ready_aggregator();
    handle.attach_readiness(aggregator.subscribe()).unwrap();

    handle.start().await.unwrap();
    let snapshot = wait_state(&handle, SessionState::Idle).await;

    assert_eq!(
        snapshot.last_error,
        Some(SessionError::BackgroundStartFailure(ServiceError::AckTimeout {
            timeout: Duration::from_millis(50),
        }))
    );
    assert_eq!(service.starts.load(Ordering::SeqCst), 1);
    wait_until(|| service.stops.load(Ordering::SeqCst) == 1).await;
    assert_eq!(handle.metrics().start_failures, 1);

    session.shutdown().await;
}

/// A rejected start reports the failure and leaves the session usable.
#[tokio::test]
async fn test_rejected_start_reports_failure() {
    let service = SimulatedLocationService::new(
        SimulatedServiceConfig::default()
            .with_ack_delay(Duration::ZERO)
            .with_fail_start(true),
    );
    let session = spawn_session(&service);
    let handle = session.handle();
    let aggregator = ready_aggregator();
    handle.attach_readiness(aggregator.subscribe()).unwrap();

    handle.start().await.unwrap();
    let snapshot = wait_state(&handle, SessionState::Idle).await;

    assert!(matches!(
        snapshot.last_error,
        Some(SessionError::BackgroundStartFailure(ServiceError::StartRejected(_)))
    ));
    assert_eq!(service.running_count(), 0);
    assert!(handle.path().is_empty());

    session.shutdown().await;
}

/// Tearing down the screen keeps tracking; a new screen takes over.
#[tokio::test]
async fn test_recreated_screen_adopts_running_session() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let location = LocationSwitch::new(true);
    let prompt = Arc::new(RecordingPrompt::default());

    let mut first = screen_for(handle.clone(), &location, &prompt);
    first.on_create().unwrap();
    first.on_surface_ready();
    first.on_resume().unwrap();
    wait_until(|| first.start_enabled()).await;

    let id = first.start_tracking().await.unwrap();
    wait_state(&handle, SessionState::Active).await;

    first.on_pause().unwrap();
    first.on_destroy();
    drop(first);
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handle.state(), SessionState::Active);
    assert!(service.is_running(id));

    // New screen appears; attaching while not yet eligible does not stop
    let mut second = screen_for(handle.clone(), &location, &prompt);
    second.on_create().unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(handle.state(), SessionState::Active);

    second.on_surface_ready();
    second.on_resume().unwrap();
    wait_until(|| second.start_enabled()).await;
    assert_eq!(handle.snapshot().session_id, Some(id));
    assert!(!second.path().is_empty());

    // Now the new screen's readiness governs the session
    location.set(false);
    second.on_pause().unwrap();
    second.on_resume().unwrap();

    wait_state(&handle, SessionState::Idle).await;
    assert_eq!(service.stop_count(), 1);
    assert_eq!(prompt.prompts.load(Ordering::SeqCst), 0);

    drop(second);
    session.shutdown().await;
}

/// A new screen that finds location off stops the session it inherits.
#[tokio::test]
async fn test_recreated_screen_with_location_off_stops_session() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let location = LocationSwitch::new(true);
    let prompt = Arc::new(RecordingPrompt::default());

    let mut first = screen_for(handle.clone(), &location, &prompt);
    first.on_create().unwrap();
    first.on_surface_ready();
    first.on_resume().unwrap();
    wait_until(|| first.start_enabled()).await;
    let id = first.start_tracking().await.unwrap();
    wait_state(&handle, SessionState::Active).await;
    drop(first);

    location.set(false);

    let mut second = screen_for(handle.clone(), &location, &prompt);
    let mut readiness = second.subscribe_readiness();
    second.on_create().unwrap();

    let snapshot = wait_state(&handle, SessionState::Idle).await;
    assert_eq!(snapshot.session_id, Some(id));
    assert_eq!(prompt.prompts.load(Ordering::SeqCst), 1);
    assert!(!service.is_running(id));

    let reported = tokio::time::timeout(WAIT, readiness.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(reported.blocked());

    // Finishing the screen's lifecycle does not stop anything further
    second.on_surface_ready();
    second.on_resume().unwrap();
    let settled = second.path().len();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(second.path().len(), settled);
    assert_eq!(service.stop_count(), 1);
    assert_eq!(handle.metrics().forced_stops, 1);

    drop(second);
    session.shutdown().await;
}

/// Following starts after the delay and stops when the screen pauses.
#[tokio::test]
async fn test_follow_location_tracks_foreground() {
    let service = fast_service();
    let session = spawn_session(&service);
    let handle = session.handle();
    let location = LocationSwitch::new(true);
    let prompt = Arc::new(RecordingPrompt::default());
    let mut screen = screen_for(handle.clone(), &location, &prompt);

    screen.on_create().unwrap();
    screen.on_surface_ready();
    screen.on_resume().unwrap();
    wait_until(|| screen.start_enabled()).await;

    screen.start_tracking().await.unwrap();
    let snapshot = wait_state(&handle, SessionState::Active).await;
    assert!(!snapshot.following);

    tokio::time::timeout(WAIT, handle.wait_for(|s| s.following))
        .await
        .unwrap()
        .unwrap();

    screen.on_pause().unwrap();
    tokio::time::timeout(WAIT, handle.wait_for(|s| !s.following))
        .await
        .unwrap()
        .unwrap();

    screen.stop_tracking().await.unwrap();
    let snapshot = wait_state(&handle, SessionState::Idle).await;
    assert!(!snapshot.following);

    drop(screen);
    session.shutdown().await;
}
