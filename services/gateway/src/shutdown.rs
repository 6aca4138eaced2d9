//! Graceful Shutdown Module
//!
//! Background tasks are owned by a [`ShutdownCoordinator`] and stopped
//! through one [`CancellationToken`], the same token type the client
//! manager's startup and every upstream call observe. Tasks still running
//! when the grace period ends are aborted and reported by name.

use std::future::Future;
use std::time::Duration;

use rust_common::CancellationToken;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Outcome of [`ShutdownCoordinator::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Tasks that stopped within the grace period
    pub stopped: Vec<&'static str>,
    /// Tasks aborted when the grace period ran out
    pub aborted: Vec<&'static str>,
}

impl ShutdownReport {
    /// Whether every task stopped on its own.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.aborted.is_empty()
    }
}

/// Shutdown coordinator for graceful termination
pub struct ShutdownCoordinator {
    token: CancellationToken,
    completion_tx: watch::Sender<bool>,
    tasks: JoinSet<&'static str>,
    names: Vec<&'static str>,
}

impl ShutdownCoordinator {
    /// Creates a new shutdown coordinator
    #[must_use]
    pub fn new() -> Self {
        let (completion_tx, _) = watch::channel(false);
        Self {
            token: CancellationToken::new(),
            completion_tx,
            tasks: JoinSet::new(),
            names: Vec::new(),
        }
    }

    /// Token cancelled when shutdown begins.
    ///
    /// Pass it to [`crate::ClientManager::start`] or to upstream calls so
    /// they give up as soon as the process is asked to stop.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Gets a shutdown receiver
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            token: self.token.child_token(),
        }
    }

    /// Watches for shutdown completion
    #[must_use]
    pub fn completion(&self) -> watch::Receiver<bool> {
        self.completion_tx.subscribe()
    }

    /// Spawns a background task that is cancelled on shutdown
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.child_token();
        self.names.push(name);
        self.tasks.spawn(async move {
            tokio::select! {
                () = future => info!(task = name, "Background task completed"),
                () = token.cancelled() => info!(task = name, "Background task cancelled by shutdown"),
            }
            name
        });
    }

    /// Cancels every task and waits up to `timeout` for them to stop
    pub async fn shutdown(mut self, timeout: Duration) -> ShutdownReport {
        info!(tasks = self.tasks.len(), "Initiating graceful shutdown");
        self.token.cancel();

        let mut stopped = Vec::with_capacity(self.names.len());
        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                match result {
                    Ok(name) => stopped.push(name),
                    Err(e) => warn!(error = %e, "Task failed during shutdown"),
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown timeout reached, aborting remaining tasks");
            self.tasks.abort_all();
        }

        let aborted = if drained.is_ok() {
            Vec::new()
        } else {
            self.names
                .iter()
                .copied()
                .filter(|name| !stopped.contains(name))
                .collect()
        };

        let _ = self.completion_tx.send(true);
        info!(stopped = stopped.len(), aborted = aborted.len(), "Shutdown complete");
        ShutdownReport { stopped, aborted }
    }

    /// Returns the number of active tasks
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("tasks", &self.names)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Shutdown signal receiver
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Waits for shutdown signal
    pub async fn recv(self) {
        self.token.cancelled().await;
    }

    /// Checks if shutdown has been signaled (non-blocking)
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Waits for SIGTERM or SIGINT
pub async fn wait_for_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating shutdown"),
        () = terminate => info!("Received SIGTERM, initiating shutdown"),
    }
}

/// Waits for `trigger`, then shuts the coordinator's tasks down
pub async fn run_until_shutdown<F>(
    trigger: F,
    coordinator: ShutdownCoordinator,
    grace: Duration,
) -> ShutdownReport
where
    F: Future<Output = ()>,
{
    trigger.await;
    coordinator.shutdown(grace).await
}
