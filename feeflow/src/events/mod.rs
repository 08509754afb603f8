//! Lifecycle events emitted by the orchestrator.
//!
//! Events mirror what is written to the status files, for embedders that
//! want to react to runs without tailing logs.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use crate::core::{RunRecord, SkippedTick};
use serde::Serialize;

/// Something that happened to a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    /// A child process is about to be spawned.
    RunStarted {
        /// Job id.
        job_id: String,
        /// Run id.
        run_id: uuid::Uuid,
    },
    /// A run reached a terminal status.
    RunCompleted(RunRecord),
    /// A tick was dropped.
    TickSkipped(SkippedTick),
    /// A job stopped being scheduled because of its restart policy.
    JobRetired {
        /// Job id.
        job_id: String,
    },
}

impl OrchestratorEvent {
    /// Dotted event name, e.g. `run.completed`.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run.started",
            Self::RunCompleted(_) => "run.completed",
            Self::TickSkipped(_) => "tick.skipped",
            Self::JobRetired { .. } => "job.retired",
        }
    }

    /// The job the event concerns.
    #[must_use]
    pub fn job_id(&self) -> &str {
        match self {
            Self::RunStarted { job_id, .. } | Self::JobRetired { job_id } => job_id,
            Self::RunCompleted(record) => record.job_id(),
            Self::TickSkipped(skip) => &skip.job_id,
        }
    }
}
