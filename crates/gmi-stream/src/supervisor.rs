//! Supervisor: keeps one stream alive across faults.
//!
//! ```text
//! Starting ──► Running ──Ok(())──────────────────────────► Stopped
//!                 │
//!                 └─Err(fault)─► BackingOff ──sleep(backoff)──► Restarting ──► Running
//!                                    │
//!                                    └─lifetime cancelled─────► Stopped
//! ```
//!
//! Rules:
//! - Every instance runs in its own tokio task, so a panic is caught at the
//!   join handle and treated like any other fault.
//! - Restarts are unbounded with a fixed backoff.
//! - The next instance's task registration is taken before the previous one
//!   is released, so the outstanding-task count never drops to zero while a
//!   restart is pending.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gmi_core::lifecycle::{ShutdownCoordinator, TaskRegistration};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::task::{StreamFault, TaskOutcome};

/// Default delay before a failed stream is relaunched.
pub const DEFAULT_RESTART_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    BackingOff,
    Restarting,
    Stopped,
}

/// Launches one stream task instance for a given lifetime token.
pub type TaskFactory = Arc<dyn Fn(CancellationToken) -> JoinHandle<TaskOutcome> + Send + Sync>;

/// Wrap an async task constructor into a [`TaskFactory`] that spawns each
/// instance on its own tokio task.
pub fn task_factory<F, Fut>(make: F) -> TaskFactory
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskOutcome> + Send + 'static,
{
    Arc::new(move |cancel| tokio::spawn(make(cancel)))
}

pub struct Supervisor {
    label: String,
    coordinator: ShutdownCoordinator,
    backoff: Duration,
    factory: TaskFactory,
    state: watch::Sender<SupervisorState>,
    launches: Arc<AtomicU64>,
}

/// Handle to a spawned supervisor.
pub struct SupervisorHandle {
    pub label: String,
    task: JoinHandle<()>,
    state: watch::Receiver<SupervisorState>,
    launches: Arc<AtomicU64>,
}

impl SupervisorHandle {
    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    /// Number of stream task instances launched so far (first run included).
    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    /// Wait until the supervisor reaches `state`.
    pub async fn wait_for_state(&mut self, state: SupervisorState) {
        let _ = self.state.wait_for(|s| *s == state).await;
    }

    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("[supervisor {}] join failed: {e}", self.label);
        }
    }
}

impl Supervisor {
    pub fn new(
        label: impl Into<String>,
        coordinator: ShutdownCoordinator,
        backoff: Duration,
        factory: TaskFactory,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Starting);
        Self { label: label.into(), coordinator, backoff, factory, state, launches: Arc::new(AtomicU64::new(0)) }
    }

    /// Register the first instance and spawn the supervision loop.
    pub fn spawn(self) -> SupervisorHandle {
        let registration = self.coordinator.register(format!("stream {}", self.label));
        let label = self.label.clone();
        let state = self.state.subscribe();
        let launches = self.launches.clone();
        let task = tokio::spawn(self.run(registration));
        SupervisorHandle { label, task, state, launches }
    }

    async fn run(self, mut registration: TaskRegistration) {
        let token = self.coordinator.token();
        let label = &self.label;

        loop {
            self.set_state(SupervisorState::Running);
            let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
            debug!("[supervisor {label}] launching attempt {attempt}");

            let outcome = match (self.factory)(token.clone()).await {
                Ok(outcome) => outcome,
                Err(e) => Err(fault_from_join_error(e)),
            };

            let fault = match outcome {
                Ok(()) => break,
                Err(fault) => fault,
            };
            if token.is_cancelled() {
                info!("[supervisor {label}] stream ended during shutdown: {fault}");
                break;
            }

            error!("[supervisor {label}] stream failed: {fault}, waiting {:?} and restarting", self.backoff);
            self.set_state(SupervisorState::BackingOff);
            tokio::select! {
                _ = tokio::time::sleep(self.backoff) => {}
                _ = token.cancelled() => break,
            }

            self.set_state(SupervisorState::Restarting);
            let next = self.coordinator.register(format!("stream {label}"));
            registration = next;
        }

        self.set_state(SupervisorState::Stopped);
        info!("[supervisor {label}] stopped after {} launch(es)", self.launches.load(Ordering::SeqCst));
        drop(registration);
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
    }
}

fn fault_from_join_error(e: JoinError) -> StreamFault {
    if !e.is_panic() {
        return StreamFault::Aborted(e.to_string());
    }
    let payload = e.into_panic();
    let msg = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    StreamFault::Panicked(msg)
}
