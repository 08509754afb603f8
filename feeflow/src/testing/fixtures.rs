//! Job fixtures backed by `/bin/sh -c` scripts.

use crate::config::{JobTable, Settings};
use crate::errors::Result;
use crate::events::CollectingEventSink;
use crate::job::{CommandSpec, JobDescriptor, LogPaths};
use crate::orchestrator::Orchestrator;
use crate::schedule::{CronExpr, ScheduleZone};
use crate::supervisor::MemoryProbe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Settings with short polls and graces, evaluated in UTC.
#[must_use]
pub fn fast_settings() -> Settings {
    Settings {
        timezone: ScheduleZone::Utc,
        memory_poll_interval: Duration::from_millis(20),
        kill_grace: Duration::from_millis(500),
        shutdown_grace: Duration::from_secs(5),
        ..Settings::default()
    }
}

/// A job running `script` through `/bin/sh -c`, firing every second,
/// logging under `log_dir`.
#[must_use]
pub fn script_job(id: &str, script: &str, log_dir: &Path) -> JobDescriptor {
    let schedule = CronExpr::parse("* * * * * *").unwrap_or_else(|e| panic!("fixture schedule: {e}"));
    JobDescriptor::new(
        id,
        CommandSpec::new("/bin/sh").with_args(["-c", script]),
        schedule,
    )
    .with_log_paths(LogPaths::in_dir(log_dir, id))
}

/// Builds a job table and an orchestrator that records its events.
#[derive(Debug)]
pub struct TestPipeline {
    log_dir: PathBuf,
    settings: Settings,
    jobs: Vec<JobDescriptor>,
}

impl TestPipeline {
    /// Starts an empty pipeline logging under `log_dir`.
    #[must_use]
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            settings: fast_settings(),
            jobs: Vec::new(),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Adds a script job.
    #[must_use]
    pub fn script(self, id: &str, script: &str) -> Self {
        let job = script_job(id, script, &self.log_dir);
        self.job(job)
    }

    /// Adds a script job gated on `upstream`.
    #[must_use]
    pub fn gated_script(self, id: &str, script: &str, upstream: &str) -> Self {
        let job = script_job(id, script, &self.log_dir).with_upstream(upstream);
        self.job(job)
    }

    /// Adds an arbitrary job.
    #[must_use]
    pub fn job(mut self, job: JobDescriptor) -> Self {
        self.jobs.push(job);
        self
    }

    /// Log directory of the pipeline.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Validates the table.
    pub fn table(&self) -> Result<JobTable> {
        Ok(JobTable::new(self.settings.clone(), self.jobs.clone())?)
    }

    /// Builds an orchestrator with `probe`, returning it with its event log.
    pub async fn build(
        &self,
        probe: Arc<dyn MemoryProbe>,
    ) -> Result<(Arc<Orchestrator>, Arc<CollectingEventSink>)> {
        let events = Arc::new(CollectingEventSink::new());
        let orchestrator = Orchestrator::with_parts(self.table()?, probe, events.clone()).await?;
        Ok((Arc::new(orchestrator), events))
    }
}
