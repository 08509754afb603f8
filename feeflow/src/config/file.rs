//! On-disk shape of the job table.

use crate::job::{ByteSize, EnvOverrides, RestartPolicy};
use crate::schedule::ScheduleZone;
use crate::utils::DEFAULT_LOG_DATE_FORMAT;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Directory for default log file locations.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// strftime pattern for log line timestamps.
    #[serde(default = "default_log_date_format")]
    pub log_date_format: String,
    /// Wall clock for cron evaluation and log timestamps.
    #[serde(default)]
    pub timezone: ScheduleZone,
    /// Whether downstream stages wait for a successful upstream run.
    #[serde(default = "default_true")]
    pub gate_on_upstream: bool,
    /// Interval between resident memory samples.
    #[serde(default = "default_memory_poll_interval_ms")]
    pub memory_poll_interval_ms: u64,
    /// Grace between SIGTERM and SIGKILL.
    #[serde(default = "default_kill_grace_ms")]
    pub kill_grace_ms: u64,
    /// How long shutdown waits for in-flight runs.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// The jobs.
    pub jobs: Vec<JobConfig>,
}

/// One entry of the job table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Stage id.
    pub name: String,
    /// Executable path or name.
    pub command: String,
    /// Arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Cron expression.
    pub schedule: String,
    /// Memory ceiling, `0` for unbounded.
    #[serde(default)]
    pub max_memory: ByteSize,
    /// Wall-clock timeout per run.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Static environment overrides.
    #[serde(default)]
    pub env: EnvOverrides,
    /// Stdout / combined stream file.
    #[serde(default)]
    pub out_file: Option<PathBuf>,
    /// Stderr stream file.
    #[serde(default)]
    pub error_file: Option<PathBuf>,
    /// Status line file.
    #[serde(default)]
    pub status_file: Option<PathBuf>,
    /// Copy stderr into the out file.
    #[serde(default = "default_true")]
    pub merge_logs: bool,
    /// Stage whose success gates this job.
    #[serde(default)]
    pub upstream: Option<String>,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_date_format() -> String {
    DEFAULT_LOG_DATE_FORMAT.to_string()
}

fn default_true() -> bool {
    true
}

fn default_memory_poll_interval_ms() -> u64 {
    1000
}

fn default_kill_grace_ms() -> u64 {
    5000
}

fn default_shutdown_grace_ms() -> u64 {
    30_000
}

impl JobConfig {
    /// A job entry with every optional field at its default.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        command: impl Into<String>,
        schedule: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            schedule: schedule.into(),
            max_memory: ByteSize::UNBOUNDED,
            timeout_secs: None,
            restart_policy: RestartPolicy::default(),
            env: EnvOverrides::default(),
            out_file: None,
            error_file: None,
            status_file: None,
            merge_logs: true,
            upstream: None,
        }
    }
}

impl FileConfig {
    /// A configuration with default settings and the given jobs.
    #[must_use]
    pub fn with_jobs(jobs: Vec<JobConfig>) -> Self {
        Self {
            log_dir: default_log_dir(),
            log_date_format: default_log_date_format(),
            timezone: ScheduleZone::default(),
            gate_on_upstream: true,
            memory_poll_interval_ms: default_memory_poll_interval_ms(),
            kill_grace_ms: default_kill_grace_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            jobs,
        }
    }
}
