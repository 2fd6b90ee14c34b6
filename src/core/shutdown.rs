use tokio_util::sync::CancellationToken;
use tracing::info;

/// Graceful shutdown coordinator.
///
/// Uses `CancellationToken` to broadcast the shutdown signal. The HTTP
/// server drains in-flight requests when the token fires; there are no
/// background pipelines to stop beyond that.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Returns a clone of the cancellation token for use by tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Triggers shutdown for all tasks listening on this token.
    pub fn trigger_shutdown(&self) {
        info!("shutdown signal received, broadcasting to all tasks");
        self.token.cancel();
    }

    /// Wait for a shutdown signal (SIGTERM or SIGINT) and trigger coordinated shutdown.
    pub async fn wait_for_signal_and_shutdown(&self) {
        let ctrl_c = tokio::signal::ctrl_c();
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = ctrl_c => {
                info!("received SIGINT (Ctrl+C)");
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM");
            }
        }

        self.trigger_shutdown();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Total shutdown timeout in seconds before forcing exit.
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
