//! Periodic sweep of idle sessions and long-expired refresh tokens.

use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::manager::SessionManager;

pub struct CleanupService;

impl CleanupService {
    /// Run one sweep per `interval` until `shutdown` is cancelled.
    ///
    /// The first sweep runs immediately. Failures are logged and retried on
    /// the next tick.
    #[must_use]
    pub fn spawn(
        manager: Arc<SessionManager>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let period = if interval.is_zero() {
            Duration::from_secs(1)
        } else {
            interval
        };

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!("session cleanup every {}s", period.as_secs());

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("session cleanup shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        Self::run_once(&manager).await;
                    }
                }
            }
        })
    }

    /// One sweep. Each half runs even if the other fails.
    pub async fn run_once(manager: &SessionManager) {
        match manager.cleanup_expired_sessions().await {
            Ok(revoked) => debug!(revoked, "idle session sweep finished"),
            Err(err) => error!("failed to clean up idle sessions: {err}"),
        }

        match manager.cleanup_expired_tokens().await {
            Ok(deleted) => debug!(deleted, "expired refresh token sweep finished"),
            Err(err) => error!("failed to clean up expired refresh tokens: {err}"),
        }
    }
}
