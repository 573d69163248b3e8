//! # gmi-stream
//!
//! Exchange side of the pipeline: stream tasks, their supervisors, and the
//! wiring that starts one supervised stream per (market, channel).
//!
//! - [`task`]: `StreamTask`: connect, subscribe, frames → index operations
//! - [`supervisor`]: fixed-backoff restart state machine
//! - [`pipeline`]: `PipelineContext` + `Pipeline::start`

pub mod pipeline;
pub mod supervisor;
pub mod task;

pub use pipeline::{Pipeline, PipelineContext};
pub use supervisor::{Supervisor, SupervisorHandle, SupervisorState};
pub use task::{StreamFault, StreamSettings, StreamTask, TaskOutcome};
