//! # Feeflow
//!
//! A cron-driven supervisor for a three-stage revenue pipeline:
//! collect fees, swap the proceeds, distribute them.
//!
//! Feeflow provides:
//!
//! - **Cron scheduling**: per-job timers with 5/6-field cron expressions
//! - **Process supervision**: memory ceilings, timeouts, SIGTERM then SIGKILL
//! - **Overlap protection**: at most one run per job at any time
//! - **Upstream gating**: a stage only runs after its upstream succeeded
//! - **Durable logs**: append-only output and JSON status files per job
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use feeflow::prelude::*;
//! use std::sync::Arc;
//!
//! let table = JobTable::load("feeflow.json".as_ref())?;
//! let orchestrator = Arc::new(Orchestrator::from_table(table).await?);
//!
//! let shutdown = ShutdownToken::new();
//! orchestrator.run_until(shutdown).await;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod job;
pub mod lock;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod schedule;
pub mod shutdown;
pub mod supervisor;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{resolve_config_path, JobTable, Settings};
    pub use crate::core::{RunRecord, RunStatus, SkipReason, SkippedTick};
    pub use crate::errors::{ConfigError, FeeflowError, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, OrchestratorEvent};
    pub use crate::job::{ByteSize, CommandSpec, JobDescriptor, RestartDecision, RestartPolicy};
    pub use crate::lock::{RunGuard, RunLock};
    pub use crate::logging::{read_last_status, JobLogSink, StatusLine};
    pub use crate::orchestrator::{Orchestrator, TickOutcome};
    pub use crate::pipeline::{GateBlock, PipelineCoordinator, StageHealth};
    pub use crate::schedule::{CronExpr, CronTrigger, ScheduleZone};
    pub use crate::shutdown::ShutdownToken;
    pub use crate::supervisor::{MemoryProbe, Supervisor, SupervisorConfig};
    pub use crate::utils::Timestamp;
}
