//! The orchestrator: schedules every job and runs ticks through the lock,
//! the gate and the supervisor.
//!
//! One timer loop per job waits for that job's next fire. Each fire is
//! spawned as its own task, so a long run never delays the timer and an
//! overlapping tick meets the held [`RunLock`] and is skipped.

mod integration_tests;
mod job_loop;

use crate::config::{JobTable, Settings};
use crate::core::{ActiveRun, RunRecord, SkipReason, SkippedTick};
use crate::errors::{FeeflowError, Result};
use crate::events::{EventSink, NoOpEventSink, OrchestratorEvent};
use crate::job::{JobDescriptor, RestartDecision};
use crate::lock::RunLock;
use crate::logging::JobLogSink;
use crate::pipeline::PipelineCoordinator;
use crate::shutdown::ShutdownToken;
use crate::supervisor::{default_probe, MemoryProbe, Supervisor, SupervisorConfig};
use crate::utils::Timestamp;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// What a tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// A child ran to a terminal status.
    Ran {
        /// The finished record.
        record: RunRecord,
        /// What the job's restart policy says about future ticks.
        decision: RestartDecision,
    },
    /// No child was started.
    Skipped(SkippedTick),
}

impl TickOutcome {
    /// The run record, if a child ran.
    #[must_use]
    pub fn record(&self) -> Option<&RunRecord> {
        match self {
            Self::Ran { record, .. } => Some(record),
            Self::Skipped(_) => None,
        }
    }

    /// The skip reason, if the tick was dropped.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Ran { .. } => None,
            Self::Skipped(skip) => Some(&skip.reason),
        }
    }
}

/// A job together with its open log files.
#[derive(Debug, Clone)]
pub(crate) struct JobSlot {
    pub(crate) job: Arc<JobDescriptor>,
    pub(crate) sink: Arc<JobLogSink>,
}

/// Owns the job table and every piece of per-process state.
pub struct Orchestrator {
    table: JobTable,
    lock: RunLock,
    coordinator: PipelineCoordinator,
    supervisor: Supervisor,
    slots: HashMap<String, JobSlot>,
    events: Arc<dyn EventSink>,
    abandon: ShutdownToken,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("jobs", &self.coordinator.order())
            .field("supervisor", &self.supervisor)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Builds an orchestrator with the platform memory probe and no event sink.
    pub async fn from_table(table: JobTable) -> Result<Self> {
        Self::with_parts(table, default_probe(), Arc::new(NoOpEventSink)).await
    }

    /// Builds an orchestrator with an explicit probe and event sink.
    ///
    /// Opens every job's log files up front, so an unwritable log
    /// directory fails here rather than on the first tick.
    pub async fn with_parts(
        table: JobTable,
        probe: Arc<dyn MemoryProbe>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let settings = table.settings();
        let coordinator = PipelineCoordinator::new(
            table.jobs().iter().map(|job| &**job),
            settings.gate_on_upstream,
        )?;
        let supervisor = Supervisor::new(probe, SupervisorConfig::from(settings));

        let mut slots = HashMap::with_capacity(table.jobs().len());
        for job in table.jobs() {
            let sink = Arc::new(JobLogSink::open(job, settings).await?);
            let slot = JobSlot {
                job: Arc::clone(job),
                sink,
            };
            slots.insert(job.id().to_string(), slot);
        }

        Ok(Self {
            table,
            lock: RunLock::new(),
            coordinator,
            supervisor,
            slots,
            events,
            abandon: ShutdownToken::new(),
        })
    }

    /// The job table.
    #[must_use]
    pub fn table(&self) -> &JobTable {
        &self.table
    }

    /// Process-wide settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        self.table.settings()
    }

    /// The per-job run lock.
    #[must_use]
    pub fn lock(&self) -> &RunLock {
        &self.lock
    }

    /// The pipeline coordinator and its stage health.
    #[must_use]
    pub fn coordinator(&self) -> &PipelineCoordinator {
        &self.coordinator
    }

    /// Handles one scheduled tick of `job_id` at the current time.
    pub async fn tick(&self, job_id: &str) -> Result<TickOutcome> {
        let slot = self.slot(job_id)?;
        Ok(self.fire(slot, Some(chrono::Utc::now()), true).await)
    }

    /// Runs `job_id` immediately. `force` bypasses the upstream gate but
    /// never the run lock.
    pub async fn run_now(&self, job_id: &str, force: bool) -> Result<TickOutcome> {
        let slot = self.slot(job_id)?;
        Ok(self.fire(slot, None, !force).await)
    }

    /// Schedules every job until `shutdown` is triggered or every job has
    /// retired. In-flight runs get `shutdown_grace` to finish.
    pub async fn run_until(self: Arc<Self>, shutdown: ShutdownToken) {
        info!(jobs = self.table.jobs().len(), "Starting job loops");

        let mut loops = JoinSet::new();
        for job in self.table.jobs() {
            if let Some(slot) = self.slots.get(job.id()).cloned() {
                loops.spawn(job_loop::run(Arc::clone(&self), slot, shutdown.clone()));
            }
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Job loop panicked");
            }
        }

        info!(reason = ?shutdown.reason(), "All job loops stopped");
    }

    fn slot(&self, job_id: &str) -> Result<&JobSlot> {
        self.slots
            .get(job_id)
            .ok_or_else(|| FeeflowError::UnknownJob(job_id.to_string()))
    }

    /// Lock, gate, supervise, record. The lock is held until the record
    /// is written and stage health updated.
    pub(crate) async fn fire(
        &self,
        slot: &JobSlot,
        scheduled_for: Option<Timestamp>,
        gated: bool,
    ) -> TickOutcome {
        let JobSlot { job, sink } = slot;

        let Some(guard) = self.lock.try_acquire(job.id()) else {
            return self.skip(slot, scheduled_for, SkipReason::Overlap).await;
        };

        if gated {
            if let Err(block) = self.coordinator.may_run(job.id()) {
                drop(guard);
                return self.skip(slot, scheduled_for, block.into()).await;
            }
        }

        let run = ActiveRun::begin(job.id());
        info!(job = job.id(), run_id = %run.run_id(), command = %job.command(), "Starting run");
        self.events
            .emit(&OrchestratorEvent::RunStarted {
                job_id: job.id().to_string(),
                run_id: run.run_id(),
            })
            .await;

        let record = self
            .supervisor
            .supervise(run, job, Arc::clone(sink), &self.abandon)
            .await;

        if let Err(e) = sink.write_run(&record).await {
            warn!(job = job.id(), error = %e, "Failed to write status line");
        }
        self.coordinator.record(&record);
        log_finished(&record);
        self.events.emit(&OrchestratorEvent::RunCompleted(record.clone())).await;

        let decision = job.restart_policy().decide(record.status());
        drop(guard);

        TickOutcome::Ran { record, decision }
    }

    async fn skip(
        &self,
        slot: &JobSlot,
        scheduled_for: Option<Timestamp>,
        reason: SkipReason,
    ) -> TickOutcome {
        let job_id = slot.job.id();
        let skip = SkippedTick::now(job_id, scheduled_for, reason);
        warn!(job = job_id, reason = %skip.reason, "Skipping tick");

        if let Err(e) = slot.sink.write_skip(&skip).await {
            warn!(job = job_id, error = %e, "Failed to write status line");
        }
        self.events.emit(&OrchestratorEvent::TickSkipped(skip.clone())).await;

        TickOutcome::Skipped(skip)
    }

    /// Terminates every in-flight child, and any started later. Each run
    /// still finishes with a failed record before its lock is released.
    pub(crate) fn abandon_runs(&self) {
        self.abandon.trigger("orchestrator shutdown");
    }

    pub(crate) async fn retire(&self, job: &JobDescriptor) {
        warn!(
            job = job.id(),
            policy = ?job.restart_policy(),
            "Job retired by restart policy; no further ticks"
        );
        self.events
            .emit(&OrchestratorEvent::JobRetired {
                job_id: job.id().to_string(),
            })
            .await;
    }
}

fn log_finished(record: &RunRecord) {
    let duration_ms = record.duration().map(|d| d.as_millis() as u64);
    if record.status().is_success() {
        info!(
            job = record.job_id(),
            run_id = %record.run_id(),
            duration_ms,
            peak_memory_bytes = record.peak_memory_bytes(),
            "Run succeeded"
        );
    } else if record.status().is_resource_kill() {
        warn!(
            job = record.job_id(),
            run_id = %record.run_id(),
            status = %record.status(),
            signal = record.signal(),
            reason = record.failure_reason().unwrap_or_default(),
            peak_memory_bytes = record.peak_memory_bytes(),
            duration_ms,
            "Run killed by the supervisor"
        );
    } else {
        warn!(
            job = record.job_id(),
            run_id = %record.run_id(),
            status = %record.status(),
            exit_code = record.exit_code(),
            reason = record.failure_reason().unwrap_or_default(),
            duration_ms,
            "Run did not succeed"
        );
    }
}
