//! Job table loading and validation.
//!
//! The job table is read once at startup. Any invalid entry stops the
//! process before a single job is scheduled.

mod file;

pub use file::{FileConfig, JobConfig};

use crate::errors::ConfigError;
use crate::job::{
    ByteSize, CommandSpec, EnvOverrides, JobDescriptor, LogPaths, COLLECT_FEES, DISTRIBUTE,
    SWAP_TOKENS,
};
use crate::pipeline::stage_order;
use crate::schedule::{CronExpr, ScheduleZone};
use crate::utils::is_valid_date_format;
use std::collections::{BTreeMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable naming the job table file.
pub const CONFIG_ENV: &str = "FEEFLOW_CONFIG";

/// Default job table file name in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "feeflow.json";

/// Process-wide settings shared by every job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// strftime pattern for log line timestamps.
    pub log_date_format: String,
    /// Wall clock for cron evaluation and log timestamps.
    pub timezone: ScheduleZone,
    /// Whether downstream stages wait for a successful upstream run.
    pub gate_on_upstream: bool,
    /// Interval between resident memory samples.
    pub memory_poll_interval: Duration,
    /// Grace between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    /// How long shutdown waits for in-flight runs.
    pub shutdown_grace: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_date_format: crate::utils::DEFAULT_LOG_DATE_FORMAT.to_string(),
            timezone: ScheduleZone::default(),
            gate_on_upstream: true,
            memory_poll_interval: Duration::from_secs(1),
            kill_grace: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

/// The validated job table.
#[derive(Debug, Clone)]
pub struct JobTable {
    settings: Settings,
    jobs: Vec<Arc<JobDescriptor>>,
}

impl JobTable {
    /// Builds a table from already-constructed descriptors, applying the
    /// same cross-job validation as a loaded file.
    pub fn new(settings: Settings, jobs: Vec<JobDescriptor>) -> Result<Self, ConfigError> {
        if jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }
        if !is_valid_date_format(&settings.log_date_format) {
            return Err(ConfigError::DateFormat(settings.log_date_format));
        }
        if settings.memory_poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        let mut seen = HashSet::new();
        for job in &jobs {
            if !seen.insert(job.id().to_string()) {
                return Err(ConfigError::DuplicateJob(job.id().to_string()));
            }
            if job.command().is_empty() {
                return Err(ConfigError::EmptyCommand(job.id().to_string()));
            }
        }

        let upstreams: BTreeMap<String, Option<String>> = jobs
            .iter()
            .map(|j| (j.id().to_string(), j.upstream().map(str::to_string)))
            .collect();
        stage_order(&upstreams)?;

        Ok(Self {
            settings,
            jobs: jobs.into_iter().map(Arc::new).collect(),
        })
    }

    /// Loads and validates a job table file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: FileConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), jobs = file.jobs.len(), "Loaded job table");
        Self::from_file(file)
    }

    /// Validates a parsed configuration file.
    pub fn from_file(file: FileConfig) -> Result<Self, ConfigError> {
        let settings = Settings {
            log_date_format: file.log_date_format,
            timezone: file.timezone,
            gate_on_upstream: file.gate_on_upstream,
            memory_poll_interval: Duration::from_millis(file.memory_poll_interval_ms),
            kill_grace: Duration::from_millis(file.kill_grace_ms),
            shutdown_grace: Duration::from_millis(file.shutdown_grace_ms),
        };

        let jobs = file
            .jobs
            .into_iter()
            .enumerate()
            .map(|(idx, job)| build_descriptor(idx, job, &file.log_dir))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(settings, jobs)
    }

    /// The canonical three-stage revenue pipeline with executables in
    /// `bin_dir`: collect every 2 minutes, swap every 2 minutes gated on
    /// collection, distribute every 5 minutes gated on the swap.
    pub fn revenue_pipeline(bin_dir: &Path, log_dir: &Path) -> Result<Self, ConfigError> {
        let stages = [
            (COLLECT_FEES, "collect_fees", "*/2 * * * *", ByteSize::from_mib(500), None),
            (SWAP_TOKENS, "swap_sol_to_sachi", "*/2 * * * *", ByteSize::from_mib(500), Some(COLLECT_FEES)),
            (DISTRIBUTE, "distribute_tokens", "*/5 * * * *", ByteSize::from_mib(1024), Some(SWAP_TOKENS)),
        ];

        let mut file = FileConfig::with_jobs(
            stages
                .into_iter()
                .map(|(name, binary, schedule, memory, upstream)| JobConfig {
                    max_memory: memory,
                    env: EnvOverrides::new().with("NODE_ENV", "production"),
                    upstream: upstream.map(str::to_string),
                    ..JobConfig::new(name, bin_dir.join(binary).display().to_string(), schedule)
                })
                .collect(),
        );
        file.log_dir = log_dir.to_path_buf();
        Self::from_file(file)
    }

    /// Process-wide settings.
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Jobs in configuration order.
    #[must_use]
    pub fn jobs(&self) -> &[Arc<JobDescriptor>] {
        &self.jobs
    }

    /// Looks up a job by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Arc<JobDescriptor>> {
        self.jobs.iter().find(|j| j.id() == id)
    }
}

fn build_descriptor(
    idx: usize,
    job: JobConfig,
    log_dir: &Path,
) -> Result<JobDescriptor, ConfigError> {
    let name = job.name.trim().to_string();
    if name.is_empty() {
        return Err(ConfigError::EmptyName(idx));
    }
    if job.command.trim().is_empty() {
        return Err(ConfigError::EmptyCommand(name));
    }

    let schedule = CronExpr::parse(&job.schedule).map_err(|source| ConfigError::Schedule {
        job: name.clone(),
        source,
    })?;

    let mut command = CommandSpec::new(job.command.trim()).with_args(job.args);
    if let Some(cwd) = job.cwd {
        command = command.with_cwd(cwd);
    }
    let command = command.resolved();
    if command.program().is_relative() {
        warn!(job = %name, program = %command.program().display(), "Command not found on PATH; runs will fail until it exists");
    }

    let defaults = LogPaths::in_dir(log_dir, &name);
    let log_paths = LogPaths {
        stdout_path: job.out_file.unwrap_or(defaults.stdout_path),
        stderr_path: job.error_file.unwrap_or(defaults.stderr_path),
        status_path: job.status_file.unwrap_or(defaults.status_path),
        merged: job.merge_logs,
    };

    let mut descriptor = JobDescriptor::new(name.clone(), command, schedule)
        .with_memory_limit(job.max_memory)
        .with_restart_policy(job.restart_policy)
        .with_env(job.env)
        .with_log_paths(log_paths);

    if let Some(secs) = job.timeout_secs {
        if secs == 0 {
            return Err(ConfigError::ZeroTimeout(name));
        }
        descriptor = descriptor.with_timeout(Duration::from_secs(secs));
    }
    if let Some(upstream) = job.upstream {
        descriptor = descriptor.with_upstream(upstream);
    }

    Ok(descriptor)
}

/// Locates the job table: explicit path, then `FEEFLOW_CONFIG`, then
/// `./feeflow.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    if let Ok(p) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(p));
    }

    let candidate = PathBuf::from(DEFAULT_CONFIG_FILE);
    if candidate.exists() {
        return Ok(candidate);
    }

    Err(ConfigError::NotFound)
}
