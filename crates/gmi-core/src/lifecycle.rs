//! Process lifetime: cancellation token, task registrations, OS signals.
//!
//! [`ShutdownCoordinator`] owns the single lifetime [`CancellationToken`] of a
//! pipeline and counts every long-running task that has registered with it.
//! The runner waits on [`ShutdownCoordinator::wait_idle`] after cancelling so
//! the process only exits once every task has drained.
//!
//! ```text
//! register() ──► TaskRegistration ──(drop)──► count -= 1
//! shutdown() ──► token.cancel()   (first call only)
//! wait_idle() ─► resolves when count == 0
//! ```

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Inner {
    token: CancellationToken,
    outstanding: watch::Sender<usize>,
    shutdown_requested: AtomicBool,
}

/// Shared lifetime token plus outstanding-task counter.
///
/// Cheap to clone; all clones observe the same token and counter.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (outstanding, _) = watch::channel(0usize);
        Self {
            inner: Arc::new(Inner {
                token: CancellationToken::new(),
                outstanding,
                shutdown_requested: AtomicBool::new(false),
            }),
        }
    }

    /// The lifetime token. Cancelled exactly once, by [`shutdown`](Self::shutdown).
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Add one entry to the outstanding-task count.
    ///
    /// The entry is removed when the returned guard is dropped, whichever way
    /// the owning task ends.
    pub fn register(&self, name: impl Into<String>) -> TaskRegistration {
        let name = name.into();
        self.inner.outstanding.send_modify(|n| *n += 1);
        debug!("[lifecycle] registered '{name}' (outstanding={})", self.outstanding());
        TaskRegistration { inner: self.inner.clone(), name }
    }

    /// Register a task and spawn it; the registration lives as long as the task.
    pub fn spawn<F>(&self, name: impl Into<String>, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let registration = self.register(name);
        tokio::spawn(async move {
            let _registration = registration;
            fut.await;
        })
    }

    /// Number of registered tasks that have not exited yet.
    pub fn outstanding(&self) -> usize {
        *self.inner.outstanding.borrow()
    }

    /// Cancel the lifetime token.
    ///
    /// Idempotent: returns `true` only for the call that triggered shutdown.
    pub fn shutdown(&self) -> bool {
        if self.inner.shutdown_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        info!("[lifecycle] initiating shutdown ({} task(s) outstanding)", self.outstanding());
        self.inner.token.cancel();
        true
    }

    /// Resolve once the outstanding-task count is zero.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.outstanding.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Wait for an OS termination signal, then cancel the lifetime token.
    ///
    /// The token is cancelled even when the signal handlers cannot be
    /// installed, so callers can still drain before reporting the error.
    pub async fn shutdown_on_signal(&self) -> std::io::Result<()> {
        self.shutdown_when(wait_for_shutdown_signal()).await
    }

    /// Cancel the lifetime token once `trigger` resolves, whatever its result.
    pub async fn shutdown_when<F>(&self, trigger: F) -> std::io::Result<()>
    where
        F: Future<Output = std::io::Result<()>>,
    {
        let res = tokio::select! {
            res = trigger => res,
            _ = self.inner.token.cancelled() => return Ok(()),
        };
        match &res {
            Ok(()) => info!("[lifecycle] got interrupt signal"),
            Err(e) => warn!("[lifecycle] signal handling failed: {e}"),
        }
        self.shutdown();
        res
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// One entry in the outstanding-task count. Dropping it removes the entry.
#[must_use = "dropping the registration immediately releases it"]
pub struct TaskRegistration {
    inner: Arc<Inner>,
    name: String,
}

impl TaskRegistration {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TaskRegistration {
    fn drop(&mut self) {
        self.inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
        debug!("[lifecycle] released '{}' (outstanding={})", self.name, *self.inner.outstanding.borrow());
    }
}

/// Waits for a termination signal.
///
/// Unix: `SIGINT`, `SIGTERM`, or `SIGQUIT`.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
