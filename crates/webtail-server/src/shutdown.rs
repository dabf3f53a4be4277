//! Process-wide cancellation root.
//!
//! Every connection token is a child of the coordinator's token, so a single
//! `shutdown()` stops the active connection's loops along with the HTTP server.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long `drain` waits for tasks when no timeout is given.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(15);

/// Owns the root cancellation token.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    root: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh root token.
    pub fn new() -> Self {
        Self::default()
    }

    /// The root token. Cancelling it stops everything.
    pub fn token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// A token cancelled with the root but cancellable on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.root.child_token()
    }

    /// Cancel the root token. Idempotent.
    pub fn shutdown(&self) {
        if !self.root.is_cancelled() {
            info!("shutdown requested");
        }
        self.root.cancel();
    }

    /// Whether `shutdown` has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Resolve on Ctrl-C or once shutdown is requested elsewhere, then cancel the root.
    pub async fn wait_for_signal(&self) {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    warn!(error = %e, "failed to listen for ctrl-c");
                }
            }
            () = self.root.cancelled() => {}
        }
        self.shutdown();
    }

    /// Cancel the root and wait up to `timeout` for `tasks` to finish.
    ///
    /// Returns `false` if the timeout elapsed first; remaining tasks are aborted.
    pub async fn drain(&self, tasks: Vec<JoinHandle<()>>, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_DRAIN_TIMEOUT);
        self.shutdown();
        info!(tasks = tasks.len(), ?timeout, "draining tasks");

        let aborts: Vec<_> = tasks.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(timeout, futures::future::join_all(tasks))
            .await
            .is_ok()
        {
            return true;
        }
        warn!(?timeout, "drain timed out, aborting remaining tasks");
        for handle in aborts {
            handle.abort();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running() {
        assert!(!ShutdownCoordinator::new().is_shutting_down());
    }

    #[test]
    fn shutdown_cancels_children() {
        let coord = ShutdownCoordinator::new();
        let child = coord.child_token();
        let root = coord.token();
        coord.shutdown();
        coord.shutdown();
        assert!(coord.is_shutting_down());
        assert!(child.is_cancelled());
        assert!(root.is_cancelled());
    }

    #[test]
    fn child_cancel_does_not_propagate_up() {
        let coord = ShutdownCoordinator::new();
        coord.child_token().cancel();
        assert!(!coord.is_shutting_down());
    }

    #[tokio::test]
    async fn wait_for_signal_returns_after_shutdown() {
        let coord = ShutdownCoordinator::new();
        coord.shutdown();
        coord.wait_for_signal().await;
        assert!(coord.is_shutting_down());
    }

    #[tokio::test]
    async fn drain_waits_for_cooperative_tasks() {
        let coord = ShutdownCoordinator::new();
        let token = coord.child_token();
        let task = tokio::spawn(async move { token.cancelled().await });
        assert!(coord.drain(vec![task], Some(Duration::from_secs(1))).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_times_out_on_stuck_tasks() {
        let coord = ShutdownCoordinator::new();
        let task = tokio::spawn(std::future::pending::<()>());
        assert!(!coord.drain(vec![task], Some(Duration::from_millis(50))).await);
    }
}
