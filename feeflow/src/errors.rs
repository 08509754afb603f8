//! Error types for the feeflow supervisor.
//!
//! Only configuration problems surface as `Err` values that stop the
//! process. Spawn failures, non-zero exits and resource-limit kills are
//! folded into a failed [`RunRecord`](crate::core::RunRecord) instead.

use crate::schedule::CronParseError;
use thiserror::Error;

/// The main error type for feeflow operations.
#[derive(Debug, Error)]
pub enum FeeflowError {
    /// The job table could not be loaded or failed validation.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A job id was referenced that is not in the job table.
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// IO error outside of a supervised run (log files, status files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration errors. Always fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No configuration file could be located.
    #[error("Could not find a job table (pass --config, set FEEFLOW_CONFIG or create ./feeflow.json)")]
    NotFound,

    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the job table.
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: String,
        /// Underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// The job table contains no jobs.
    #[error("Job table defines no jobs")]
    NoJobs,

    /// A job has an empty or whitespace-only name.
    #[error("Job at index {0} has an empty name")]
    EmptyName(usize),

    /// Two jobs share the same name.
    #[error("Duplicate job name `{0}`")]
    DuplicateJob(String),

    /// A job has an empty command path.
    #[error("Job `{0}` has an empty command")]
    EmptyCommand(String),

    /// A job's schedule is not a usable cron expression.
    #[error("Job `{job}` has an invalid schedule: {source}")]
    Schedule {
        /// Job name.
        job: String,
        /// Parse failure.
        #[source]
        source: CronParseError,
    },

    /// A timeout of zero seconds was configured.
    #[error("Job `{0}` has a zero timeout")]
    ZeroTimeout(String),

    /// A job names an upstream stage that does not exist.
    #[error("Job `{job}` names unknown upstream stage `{upstream}`")]
    UnknownUpstream {
        /// Job name.
        job: String,
        /// Upstream stage that was not found.
        upstream: String,
    },

    /// Upstream links form a cycle.
    #[error("Upstream links form a cycle through `{0}`")]
    UpstreamCycle(String),

    /// The memory poll interval is zero.
    #[error("Memory poll interval must be greater than zero")]
    ZeroPollInterval,

    /// The configured log date format is not a valid strftime pattern.
    #[error("Invalid log date format `{0}`")]
    DateFormat(String),
}

/// Result type alias for feeflow operations.
pub type Result<T> = std::result::Result<T, FeeflowError>;
