//! Screen-level coordinator that wires readiness into the tracking session.
//!
//! A [`TrackingScreen`] lives for one appearance of the tracking screen. It
//! owns that appearance's readiness inputs and hands their notifications to
//! a [`TrackingSessionHandle`], which outlives it.
//!
//! # Lifecycle
//!
//! ```text
//! on_create ──► on_surface_ready ──► on_resume ◄──► on_pause ──► on_destroy
//!   │ request permission                │ re-poll location         │ cancel permission request
//!   │ poll location (prompt if off)     │ follow live position     │ detach readiness
//!   │ attach readiness to session       │                          │ (session keeps running)
//! ```
//!
//! All platform capabilities are injected through [`ScreenCapabilities`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::path::PathAccumulator;
use crate::readiness::{
    AuthorizationError, AuthorizationGate, AuthorizationState, LocationAvailability,
    LocationStatusProvider, PermissionRequester, ReadinessAggregator, ReadinessSignal,
    ReadinessSubscription, SurfaceReadiness,
};
use crate::session::{SessionError, SessionId, TrackingSessionHandle};

/// System-settings collaborator, invoked when location is off.
///
/// Fire-and-forget: the result reaches the screen only through the next
/// location poll.
pub trait SettingsPrompt: Send + Sync {
    /// Ask the user to enable location services.
    fn prompt_enable_location(&self);
}

/// Platform capabilities the screen needs.
#[derive(Clone)]
pub struct ScreenCapabilities {
    /// Permission-UI collaborator.
    pub permissions: Arc<dyn PermissionRequester>,
    /// Location-service status flag.
    pub location: Arc<dyn LocationStatusProvider>,
    /// System-settings collaborator.
    pub settings: Arc<dyn SettingsPrompt>,
}

/// One appearance of the tracking screen.
pub struct TrackingScreen {
    aggregator: Arc<ReadinessAggregator>,
    authorization: Arc<AuthorizationGate>,
    location: LocationAvailability,
    surface: SurfaceReadiness,
    settings: Arc<dyn SettingsPrompt>,
    session: TrackingSessionHandle,
    permission_task: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl std::fmt::Debug for TrackingScreen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingScreen")
            .field("readiness", &self.aggregator.signal())
            .field("destroyed", &self.destroyed)
            .finish_non_exhaustive()
    }
}

impl TrackingScreen {
    /// Build a screen around an existing tracking session.
    pub fn new(capabilities: ScreenCapabilities, session: TrackingSessionHandle) -> Self {
        let aggregator = Arc::new(ReadinessAggregator::new());
        Self {
            authorization: Arc::new(AuthorizationGate::new(
                capabilities.permissions,
                Arc::clone(&aggregator),
            )),
            location: LocationAvailability::new(capabilities.location, Arc::clone(&aggregator)),
            surface: SurfaceReadiness::new(Arc::clone(&aggregator)),
            settings: capabilities.settings,
            aggregator,
            session,
            permission_task: None,
            destroyed: false,
        }
    }

    /// Screen created: check every precondition and connect to the session.
    pub fn on_create(&mut self) -> Result<(), SessionError> {
        info!("Tracking screen created");
        self.session.attach_readiness(self.aggregator.subscribe())?;
        self.request_authorization();

        if !self.location.poll() {
            info!("Location services disabled, prompting user");
            self.settings.prompt_enable_location();
        }
        Ok(())
    }

    /// Issue a permission request for a new cycle.
    ///
    /// Called from [`on_create`](Self::on_create) and again whenever the user
    /// explicitly asks to retry after a denial.
    pub fn request_authorization(&mut self) {
        if let Some(task) = self.permission_task.take() {
            task.abort();
        }
        self.authorization.begin_cycle();

        let gate = Arc::clone(&self.authorization);
        self.permission_task = Some(tokio::spawn(async move {
            match gate.request_authorization().await {
                Ok(AuthorizationState::Granted) => debug!("Location permission granted"),
                Ok(state) => info!(state = ?state, "Location permission not granted"),
                Err(AuthorizationError::Cancelled) => debug!("Permission request cancelled"),
                Err(e) => warn!(error = %e, "Permission request not issued"),
            }
        }));
    }

    /// The rendering surface finished its first layout and centring.
    pub fn on_surface_ready(&self) {
        self.surface.mark_ready();
    }

    /// Screen returned to the foreground.
    pub fn on_resume(&self) -> Result<(), SessionError> {
        self.location.poll();
        self.session.set_foreground(true)
    }

    /// Screen left the foreground.
    pub fn on_pause(&self) -> Result<(), SessionError> {
        self.session.set_foreground(false)
    }

    /// Screen torn down.
    ///
    /// Cancels the pending permission request and detaches readiness. A
    /// running session keeps running.
    pub fn on_destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;

        self.authorization.cancel_pending();
        if let Err(e) = self.session.detach_readiness() {
            debug!(error = %e, "Session already closed at screen teardown");
        }
        info!(session = ?self.session.state(), "Tracking screen destroyed");
    }

    /// Start button.
    pub async fn start_tracking(&self) -> Result<SessionId, SessionError> {
        self.session.start().await
    }

    /// Stop button.
    pub async fn stop_tracking(&self) -> Result<(), SessionError> {
        self.session.stop().await
    }

    /// Whether the start button should be active.
    pub fn start_enabled(&self) -> bool {
        self.aggregator.is_eligible()
    }

    /// Whether the rendering surface should be visible.
    pub fn surface_visible(&self) -> bool {
        self.surface.is_ready()
    }

    /// Current readiness inputs.
    pub fn readiness(&self) -> ReadinessSignal {
        self.aggregator.signal()
    }

    /// Ordered readiness changes, e.g. for the surface visibility toggle.
    pub fn subscribe_readiness(&self) -> ReadinessSubscription {
        self.aggregator.subscribe()
    }

    /// Current authorization state.
    pub fn authorization_state(&self) -> AuthorizationState {
        self.authorization.state()
    }

    /// Path for the renderer's overlay.
    pub fn path(&self) -> PathAccumulator {
        self.session.path()
    }

    /// The tracking session this screen drives.
    pub fn session(&self) -> &TrackingSessionHandle {
        &self.session
    }
}

impl Drop for TrackingScreen {
    fn drop(&mut self) {
        self.on_destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::service::{BackgroundService, SimulatedLocationService, SimulatedServiceConfig};
    use crate::session::{SessionState, TrackingSession};
    use crate::BoxFuture;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct Permissions(bool);

    impl PermissionRequester for Permissions {
        fn request_permission(&self) -> BoxFuture<'static, bool> {
            let granted = self.0;
            Box::pin(async move { granted })
        }
    }

    struct LocationSwitch(AtomicBool);

    impl LocationStatusProvider for LocationSwitch {
        fn is_location_enabled(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct CountingPrompt(AtomicUsize);

    impl SettingsPrompt for CountingPrompt {
        fn prompt_enable_location(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        session: TrackingSession,
        service: SimulatedLocationService,
        location: Arc<LocationSwitch>,
        prompt: Arc<CountingPrompt>,
    }

    impl Fixture {
        fn new(location_enabled: bool) -> Self {
            let service = SimulatedLocationService::new(
                SimulatedServiceConfig::default()
                    .with_sample_interval(Duration::from_millis(5))
                    .with_ack_delay(Duration::ZERO),
            );
            let session = TrackingSession::spawn(
                Arc::new(service.clone()) as Arc<dyn BackgroundService>,
                SessionConfig::default().with_follow_delay(Duration::from_millis(10)),
            );
            Self {
                session,
                service,
                location: Arc::new(LocationSwitch(AtomicBool::new(location_enabled))),
                prompt: Arc::new(CountingPrompt::default()),
            }
        }

        fn screen(&self, granted: bool) -> TrackingScreen {
            TrackingScreen::new(
                ScreenCapabilities {
                    permissions: Arc::new(Permissions(granted)),
                    location: Arc::clone(&self.location) as Arc<dyn LocationStatusProvider>,
                    settings: Arc::clone(&self.prompt) as Arc<dyn SettingsPrompt>,
                },
                self.session.handle(),
            )
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition never became true");
    }

    #[tokio::test]
    async fn test_location_off_prompts_settings() {
        let fixture = Fixture::new(false);
        let mut screen = fixture.screen(true);

        screen.on_create().unwrap();

        assert_eq!(fixture.prompt.0.load(Ordering::SeqCst), 1);
        assert!(!screen.readiness().location_enabled);
        fixture.session.shutdown().await;
    }

    #[tokio::test]
    async fn test_denied_permission_keeps_start_disabled() {
        let fixture = Fixture::new(true);
        let mut screen = fixture.screen(false);

        screen.on_create().unwrap();
        screen.on_surface_ready();
        wait_until(|| screen.authorization_state() == AuthorizationState::Denied).await;

        assert!(!screen.start_enabled());
        assert_eq!(screen.start_tracking().await, Err(SessionError::NotEligible));
        assert_eq!(fixture.service.start_count(), 0);
        fixture.session.shutdown().await;
    }

    #[tokio::test]
    async fn test_surface_visibility_follows_readiness() {
        let fixture = Fixture::new(true);
        let mut screen = fixture.screen(true);
        screen.on_create().unwrap();

        assert!(!screen.surface_visible());
        screen.on_surface_ready();
        assert!(screen.surface_visible());
        fixture.session.shutdown().await;
    }

    #[tokio::test]
    async fn test_destroy_keeps_session_running() {
        let fixture = Fixture::new(true);
        let handle = fixture.session.handle();
        let mut screen = fixture.screen(true);

        screen.on_create().unwrap();
        screen.on_surface_ready();
        screen.on_resume().unwrap();
        wait_until(|| screen.start_enabled()).await;

        let id = screen.start_tracking().await.unwrap();
        handle
            .wait_for(|s| s.state == SessionState::Active)
            .await
            .unwrap();

        drop(screen);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(handle.state(), SessionState::Active);
        assert!(fixture.service.is_running(id));
        assert_eq!(fixture.service.stop_count(), 0);

        fixture.session.shutdown().await;
        assert!(!fixture.service.is_running(id));
    }
}
