//! Graceful shutdown coordination
//!
//! SIGINT or SIGTERM cancels the shutdown token. The HTTP server stops
//! accepting connections and in-flight requests get `drain_timeout` to
//! finish before the process moves on to flushing telemetry.

use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ShutdownPhase {
    Running,
    Draining,
    Complete,
    Forced,
}

#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
    drain_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(drain_timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            drain_timeout,
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Start shutdown without a signal
    pub fn trigger(&self) {
        self.token.cancel();
    }

    /// Wait for SIGINT, SIGTERM or an explicit trigger, then cancel the token.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => info!("received SIGINT (Ctrl+C), initiating graceful shutdown"),
            _ = terminate => info!("received SIGTERM, initiating graceful shutdown"),
            _ = self.token.cancelled() => info!("shutdown requested"),
        }
        self.token.cancel();
    }

    /// Drive `server` to completion, giving it at most `drain_timeout` once
    /// shutdown has started.
    pub async fn drain<F, T>(&self, server: F) -> Option<T>
    where
        F: std::future::Future<Output = T>,
    {
        tokio::pin!(server);
        tokio::select! {
            result = &mut server => return Some(result),
            _ = self.token.cancelled() => {}
        }

        info!(phase = %ShutdownPhase::Draining, timeout_secs = self.drain_timeout.as_secs(), "waiting for in-flight requests");
        match tokio::time::timeout(self.drain_timeout, server).await {
            Ok(result) => {
                info!(phase = %ShutdownPhase::Complete, "graceful shutdown complete");
                Some(result)
            }
            Err(_) => {
                warn!(phase = %ShutdownPhase::Forced, "in-flight requests did not finish in time");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_returns_result_of_finished_server() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        assert_eq!(coordinator.drain(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn drain_gives_up_after_timeout() {
        let coordinator = ShutdownCoordinator::new(Duration::from_millis(20));
        coordinator.trigger();
        let result = coordinator.drain(std::future::pending::<()>()).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn trigger_ends_wait_for_signal() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(1));
        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_signal().await });
        coordinator.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(coordinator.is_shutdown_initiated());
    }

    #[test]
    fn phases_display_in_snake_case() {
        assert_eq!(ShutdownPhase::Draining.to_string(), "draining");
    }
}
