//! Acknowledgment timeouts around a [`BackgroundService`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{BackgroundService, ServiceError, ServiceEvents};
use crate::config::SessionConfig;
use crate::session::SessionId;

/// How a stop request concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The service confirmed termination.
    Acknowledged,
    /// No confirmation arrived within the stop timeout.
    TimedOut,
}

/// Start/stop wrapper that guarantees every command resolves.
///
/// A start that never acknowledges becomes [`ServiceError::AckTimeout`] and is
/// followed by a best-effort stop, so a late start cannot leave the process
/// running behind an idle session.
#[derive(Clone)]
pub struct BackgroundServiceLifecycle {
    service: Arc<dyn BackgroundService>,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl std::fmt::Debug for BackgroundServiceLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundServiceLifecycle")
            .field("start_timeout", &self.start_timeout)
            .field("stop_timeout", &self.stop_timeout)
            .finish_non_exhaustive()
    }
}

impl BackgroundServiceLifecycle {
    /// Wrap a service with the timeouts from `config`.
    pub fn new(service: Arc<dyn BackgroundService>, config: &SessionConfig) -> Self {
        Self {
            service,
            start_timeout: config.start_timeout,
            stop_timeout: config.stop_timeout,
        }
    }

    /// Start the service for `session` and wait for its acknowledgment.
    pub async fn start(&self, session: SessionId) -> Result<ServiceEvents, ServiceError> {
        debug!(session_id = %session, "Starting background service");

        match tokio::time::timeout(self.start_timeout, self.service.start(session)).await {
            Ok(Ok(events)) => {
                info!(session_id = %session, "Background service acknowledged start");
                Ok(events)
            }
            Ok(Err(e)) => {
                warn!(session_id = %session, error = %e, "Background service failed to start");
                Err(e)
            }
            Err(_) => {
                warn!(
                    session_id = %session,
                    timeout_ms = self.start_timeout.as_millis() as u64,
                    "Background service start timed out, releasing"
                );
                let lifecycle = self.clone();
                tokio::spawn(async move {
                    lifecycle.stop(session).await;
                });
                Err(ServiceError::AckTimeout {
                    timeout: self.start_timeout,
                })
            }
        }
    }

    /// Stop the service for `session` and wait for termination.
    pub async fn stop(&self, session: SessionId) -> StopOutcome {
        debug!(session_id = %session, "Stopping background service");

        match tokio::time::timeout(self.stop_timeout, self.service.stop(session)).await {
            Ok(()) => {
                info!(session_id = %session, "Background service stopped");
                StopOutcome::Acknowledged
            }
            Err(_) => {
                warn!(
                    session_id = %session,
                    timeout_ms = self.stop_timeout.as_millis() as u64,
                    "Background service stop not acknowledged"
                );
                StopOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Scripted {
        hang_start: bool,
        hang_stop: bool,
        stops: AtomicUsize,
    }

    impl BackgroundService for Scripted {
        fn start(&self, _session: SessionId) -> BoxFuture<'static, Result<ServiceEvents, ServiceError>> {
            let hang = self.hang_start;
            Box::pin(async move {
                if hang {
                    std::future::pending::<()>().await;
                }
                let (_tx, rx) = mpsc::channel(1);
                Ok(rx)
            })
        }

        fn stop(&self, _session: SessionId) -> BoxFuture<'static, ()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            let hang = self.hang_stop;
            Box::pin(async move {
                if hang {
                    std::future::pending::<()>().await;
                }
            })
        }
    }

    fn config() -> SessionConfig {
        SessionConfig::default()
            .with_start_timeout(Duration::from_millis(20))
            .with_stop_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_start_acknowledged() {
        let service = Arc::new(Scripted::default());
        let lifecycle = BackgroundServiceLifecycle::new(service, &config());

        assert!(lifecycle.start(SessionId::new(1)).await.is_ok());
    }

    #[tokio::test]
    async fn test_start_timeout_releases_service() {
        let service = Arc::new(Scripted {
            hang_start: true,
            ..Default::default()
        });
        let lifecycle = BackgroundServiceLifecycle::new(
            Arc::clone(&service) as Arc<dyn BackgroundService>,
            &config(),
        );

        let result = lifecycle.start(SessionId::new(1)).await;
        assert!(matches!(result, Err(ServiceError::AckTimeout { .. })));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(service.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_timeout_resolves() {
        let service = Arc::new(Scripted {
            hang_stop: true,
            ..Default::default()
        });
        let lifecycle = BackgroundServiceLifecycle::new(service, &config());

        assert_eq!(
            lifecycle.stop(SessionId::new(1)).await,
            StopOutcome::TimedOut
        );
    }
}
