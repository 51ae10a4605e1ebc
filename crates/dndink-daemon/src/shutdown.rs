//! Graceful shutdown via `CancellationToken`.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long tasks get to finish after cancellation. Covers one panel
/// refresh already in flight.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Fans one cancellation out to the session and render tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Coordinator whose token is a child of `parent`, so cancelling the
    /// parent stops everything while [`shutdown`](Self::shutdown) leaves the
    /// parent untouched.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    /// Token to hand to a task.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolves once shutdown has begun.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then wait up to `timeout` for `handle`.
    ///
    /// Returns `None` if the task panicked or overran the timeout.
    pub async fn drain<T>(&self, name: &'static str, handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
        self.shutdown();
        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(task = name, error = %e, "task ended abnormally");
                None
            }
            Err(_) => {
                warn!(task = name, timeout_secs = timeout.as_secs(), "task did not stop in time");
                None
            }
        }
    }
}

/// Wait for SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                let _ = sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
