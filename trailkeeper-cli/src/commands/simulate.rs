//! `simulate` command: run one tracking session end to end.
//!
//! Builds a tracking screen over a [`SimulatedLocationService`], walks it
//! through create, surface-ready and resume, starts tracking and prints every
//! session transition until the run ends or Ctrl+C is pressed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use trailkeeper::logging::init_logging;
use trailkeeper::readiness::{LocationStatusProvider, PermissionRequester};
use trailkeeper::service::{BackgroundService, SimulatedLocationService, SimulatedServiceConfig};
use trailkeeper::session::SessionSnapshot;
use trailkeeper::{
    BoxFuture, ScreenCapabilities, SessionError, SessionState, SettingsPrompt, TrackerConfig,
    TrackingScreen, TrackingSession,
};

use crate::error::CliError;

/// How long to wait for readiness before giving up on starting.
const READINESS_WAIT: Duration = Duration::from_secs(5);

/// Arguments for the `simulate` command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// How long to track before stopping
    #[arg(long, default_value_t = 10)]
    pub duration_secs: u64,

    /// Interval between simulated position samples in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval_ms: u64,

    /// Make the background service reject the start
    #[arg(long)]
    pub fail_start: bool,

    /// Deny the location permission request
    #[arg(long)]
    pub deny_permission: bool,

    /// Begin with location services off (the simulated user enables them)
    #[arg(long)]
    pub location_off: bool,

    /// Turn location services off after this many seconds of tracking
    #[arg(long)]
    pub revoke_after_secs: Option<u64>,

    /// Log filter directive, overriding the config file
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write daily log files to this directory
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

// =============================================================================
// Simulated platform capabilities
// =============================================================================

struct SimulatedPermissions {
    grant: bool,
}

impl PermissionRequester for SimulatedPermissions {
    fn request_permission(&self) -> BoxFuture<'static, bool> {
        let grant = self.grant;
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            grant
        })
    }
}

struct LocationSwitch(AtomicBool);

impl LocationSwitch {
    fn set(&self, enabled: bool) {
        self.0.store(enabled, Ordering::SeqCst);
    }
}

impl LocationStatusProvider for LocationSwitch {
    fn is_location_enabled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Settings dialog where the user always flips location on.
struct AcceptingSettingsPrompt {
    location: Arc<LocationSwitch>,
}

impl SettingsPrompt for AcceptingSettingsPrompt {
    fn prompt_enable_location(&self) {
        println!("Location services are off; opening system settings...");
        self.location.set(true);
    }
}

// =============================================================================
// Command
// =============================================================================

/// Run the simulation.
pub async fn run(config: TrackerConfig, args: SimulateArgs) -> Result<(), CliError> {
    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging = logging.with_level(level.as_str());
    }
    if let Some(directory) = &args.log_dir {
        logging = logging.with_directory(directory);
    }
    let _log_guard = init_logging(&logging)?;

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, stopping...");
        shutdown_signal.cancel();
    })
    .map_err(|e| CliError::Setup(format!("Failed to set signal handler: {}", e)))?;

    let service = SimulatedLocationService::new(
        SimulatedServiceConfig::default()
            .with_sample_interval(Duration::from_millis(args.interval_ms.max(1)))
            .with_fail_start(args.fail_start),
    );
    let session = TrackingSession::spawn(
        Arc::new(service.clone()) as Arc<dyn BackgroundService>,
        config.session.clone(),
    );
    let handle = session.handle();
    let printer = tokio::spawn(print_transitions(handle.subscribe()));

    let location = Arc::new(LocationSwitch(AtomicBool::new(!args.location_off)));
    let mut screen = TrackingScreen::new(
        ScreenCapabilities {
            permissions: Arc::new(SimulatedPermissions {
                grant: !args.deny_permission,
            }),
            location: Arc::clone(&location) as Arc<dyn LocationStatusProvider>,
            settings: Arc::new(AcceptingSettingsPrompt {
                location: Arc::clone(&location),
            }),
        },
        handle.clone(),
    );

    screen.on_create()?;
    screen.on_surface_ready();
    screen.on_resume()?;

    let result = drive(&screen, &location, &args, &shutdown).await;

    print_summary(&screen, &handle);
    screen.on_destroy();
    session.shutdown().await;
    printer.abort();
    result
}

async fn drive(
    screen: &TrackingScreen,
    location: &LocationSwitch,
    args: &SimulateArgs,
    shutdown: &CancellationToken,
) -> Result<(), CliError> {
    if !wait_until_eligible(screen, shutdown).await {
        let signal = screen.readiness();
        println!("Tracking not available:");
        println!("  Permission:       {:?}", signal.authorization);
        println!("  Location enabled: {}", signal.location_enabled);
        println!("  Surface ready:    {}", signal.surface_ready);
        return Ok(());
    }

    let session_id = screen.start_tracking().await?;
    println!("Tracking started (session {})", session_id);
    println!("Press Ctrl+C to stop");

    let handle = screen.session();
    let ended = handle.wait_for(|s| s.state != SessionState::Starting);
    let snapshot = tokio::select! {
        snapshot = ended => snapshot?,
        _ = shutdown.cancelled() => return stop(screen).await,
    };
    if snapshot.state != SessionState::Active {
        // Start failed; the reason is in last_error and printed by the summary.
        return Ok(());
    }

    let run_for = tokio::time::sleep(Duration::from_secs(args.duration_secs));
    tokio::pin!(run_for);

    let revoke = async {
        match args.revoke_after_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(revoke);
    let mut revoked = false;

    loop {
        tokio::select! {
            _ = &mut run_for => break,
            _ = shutdown.cancelled() => break,
            _ = handle.wait_for(|s| s.state == SessionState::Idle) => return Ok(()),
            _ = &mut revoke, if !revoked => {
                revoked = true;
                println!("Turning location services off...");
                location.set(false);
                // Leaving and re-entering the screen re-polls the location flag
                screen.on_pause()?;
                screen.on_resume()?;
            }
        }
    }

    stop(screen).await
}

async fn wait_until_eligible(screen: &TrackingScreen, shutdown: &CancellationToken) -> bool {
    let wait = async {
        while !screen.start_enabled() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::select! {
        result = tokio::time::timeout(READINESS_WAIT, wait) => result.is_ok(),
        _ = shutdown.cancelled() => false,
    }
}

async fn stop(screen: &TrackingScreen) -> Result<(), CliError> {
    match screen.stop_tracking().await {
        Ok(()) => {}
        Err(SessionError::InvalidTransition { from, .. }) => {
            info!(state = %from, "Session already stopping or stopped");
        }
        Err(e) => return Err(e.into()),
    }

    let idle = screen
        .session()
        .wait_for(|s| s.state == SessionState::Idle);
    if tokio::time::timeout(Duration::from_secs(10), idle).await.is_err() {
        warn!("Session did not reach Idle");
    }
    Ok(())
}

async fn print_transitions(mut rx: tokio::sync::watch::Receiver<SessionSnapshot>) {
    let mut last = rx.borrow_and_update().clone();
    while rx.changed().await.is_ok() {
        let snapshot = rx.borrow_and_update().clone();
        if snapshot.state != last.state {
            println!("  [{}] {}", snapshot.state, snapshot.state.display_status());
        }
        if snapshot.following && !last.following {
            println!("  Following live position");
        }
        last = snapshot;
    }
}

fn print_summary(screen: &TrackingScreen, handle: &trailkeeper::TrackingSessionHandle) {
    let snapshot = handle.snapshot();
    let path = screen.path();
    let metrics = handle.metrics();

    println!();
    println!("Session Summary");
    println!("───────────────");
    if let Some(error) = &snapshot.last_error {
        println!("  Ended with:   {}", error);
    }
    println!("  Points:       {}", path.len());
    if let (Some(first), Some(last)) = (path.snapshot().first().copied(), path.latest()) {
        println!("  First:        {}", first);
        println!("  Last:         {}", last);
    }
    if let Some(span) = path.time_span() {
        println!("  Duration:     {:.1}s", span.num_milliseconds() as f64 / 1000.0);
    }
    println!(
        "  Starts:       {} ({} failed)",
        metrics.sessions_started, metrics.start_failures
    );
    println!("  Forced stops: {}", metrics.forced_stops);
}
