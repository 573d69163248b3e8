//! Pipeline wiring: one supervised stream task per (market, channel).
//!
//! # Architecture
//!
//! ```text
//! PipelineContext ──► Pipeline::start(markets)
//!                        │
//!                        ├─► Supervisor(BTC-USD/level2) ──► StreamTask ──┐
//!                        ├─► Supervisor(BTC-USD/ticker) ──► StreamTask ──┼──► OperationSink
//!                        └─► ...                                         ┘
//! ```
//!
//! The context carries everything a stream needs (lifetime, sink, settings),
//! so several independent pipelines can run side by side.

use std::sync::Arc;
use std::time::Duration;

use gmi_core::lifecycle::ShutdownCoordinator;
use gmi_core::{OperationSink, Subscription};
use tracing::info;

use crate::supervisor::{Supervisor, SupervisorHandle, task_factory};
use crate::task::{StreamSettings, StreamTask};

/// Shared state handed to every component of one pipeline.
#[derive(Clone)]
pub struct PipelineContext {
    pub coordinator: ShutdownCoordinator,
    pub sink: Arc<dyn OperationSink>,
    pub settings: Arc<StreamSettings>,
    pub restart_backoff: Duration,
}

/// Running set of supervised streams.
pub struct Pipeline {
    supervisors: Vec<SupervisorHandle>,
}

impl Pipeline {
    /// Start one supervisor per channel for every market.
    pub fn start(ctx: &PipelineContext, markets: &[String]) -> Self {
        let supervisors = Subscription::for_markets(markets)
            .into_iter()
            .map(|sub| {
                info!("[pipeline] starting indexer for {sub}");
                spawn_stream(ctx, sub)
            })
            .collect::<Vec<_>>();

        info!("[pipeline] started {} stream(s) for {} market(s)", supervisors.len(), markets.len());
        Self { supervisors }
    }

    pub fn supervisors(&self) -> &[SupervisorHandle] {
        &self.supervisors
    }

    pub fn len(&self) -> usize {
        self.supervisors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.supervisors.is_empty()
    }

    /// Wait for every supervisor to stop.
    pub async fn join(self) {
        for sup in self.supervisors {
            sup.join().await;
        }
    }
}

/// Supervise a fresh [`StreamTask`] for `sub`.
pub fn spawn_stream(ctx: &PipelineContext, sub: Subscription) -> SupervisorHandle {
    let label = sub.label();
    let settings = ctx.settings.clone();
    let sink = ctx.sink.clone();
    let factory = task_factory(move |cancel| StreamTask::new(sub.clone(), settings.clone(), sink.clone()).run(cancel));
    Supervisor::new(label, ctx.coordinator.clone(), ctx.restart_backoff, factory).spawn()
}
