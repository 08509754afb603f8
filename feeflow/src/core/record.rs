//! Run records.
//!
//! An [`ActiveRun`] is owned by the supervisor for the lifetime of one child
//! process. Finishing it consumes it and yields an immutable [`RunRecord`].

use super::RunStatus;
use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How a child process exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExitInfo {
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one.
    pub signal: Option<i32>,
}

impl ExitInfo {
    /// Builds exit info from a process exit status.
    #[must_use]
    pub fn from_status(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

/// Why the supervisor terminated a child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillCause {
    /// Resident memory exceeded the ceiling.
    Memory {
        /// Configured ceiling in bytes.
        limit_bytes: u64,
        /// Sample that breached it.
        observed_bytes: u64,
    },
    /// The run exceeded its wall-clock bound.
    Timeout {
        /// Configured bound.
        limit: Duration,
    },
    /// The orchestrator stopped before the run finished.
    Shutdown,
}

/// Final outcome handed to [`ActiveRun::finish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child exited on its own.
    Exited(ExitInfo),
    /// The child could not be started.
    SpawnFailed(String),
    /// The child started but its exit status could not be collected.
    WaitFailed(String),
    /// The supervisor killed the child.
    Killed {
        /// Reason for the kill.
        cause: KillCause,
        /// How the child eventually exited.
        exit: ExitInfo,
    },
}

/// The record of one execution attempt of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    run_id: Uuid,
    job_id: String,
    pid: Option<u32>,
    started_at: Timestamp,
    ended_at: Option<Timestamp>,
    exit_code: Option<i32>,
    signal: Option<i32>,
    status: RunStatus,
    failure_reason: Option<String>,
    peak_memory_bytes: Option<u64>,
}

impl RunRecord {
    /// Unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The job this run belongs to.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Process id of the child, once spawned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// When the run finished; `None` while running.
    #[must_use]
    pub fn ended_at(&self) -> Option<Timestamp> {
        self.ended_at
    }

    /// Exit code of the child, if it exited normally.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Signal that terminated the child, if any.
    #[must_use]
    pub fn signal(&self) -> Option<i32> {
        self.signal
    }

    /// Status of the run.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Human-readable reason for a non-successful run.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Highest resident memory sample taken during the run.
    #[must_use]
    pub fn peak_memory_bytes(&self) -> Option<u64> {
        self.peak_memory_bytes
    }

    /// Wall-clock duration of a finished run.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at
            .and_then(|end| (end - self.started_at).to_std().ok())
    }
}

/// A run in progress. Owned exclusively by the supervisor.
#[derive(Debug)]
pub struct ActiveRun {
    record: RunRecord,
}

impl ActiveRun {
    /// Starts a new run for a job, stamped with the current time.
    #[must_use]
    pub fn begin(job_id: impl Into<String>) -> Self {
        Self {
            record: RunRecord {
                run_id: Uuid::new_v4(),
                job_id: job_id.into(),
                pid: None,
                started_at: Utc::now(),
                ended_at: None,
                exit_code: None,
                signal: None,
                status: RunStatus::Running,
                failure_reason: None,
                peak_memory_bytes: None,
            },
        }
    }

    /// Id of the run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.record.run_id
    }

    /// A `running` view of the record.
    #[must_use]
    pub fn snapshot(&self) -> RunRecord {
        self.record.clone()
    }

    /// Records the child's process id.
    pub fn set_pid(&mut self, pid: Option<u32>) {
        self.record.pid = pid;
    }

    /// Folds a resident memory sample into the peak.
    pub fn observe_memory(&mut self, bytes: u64) {
        let peak = self.record.peak_memory_bytes.get_or_insert(0);
        *peak = (*peak).max(bytes);
    }

    /// Finalizes the run. The returned record can no longer change.
    #[must_use]
    pub fn finish(self, outcome: RunOutcome) -> RunRecord {
        let mut record = self.record;
        record.ended_at = Some(Utc::now());

        match outcome {
            RunOutcome::Exited(exit) => {
                record.exit_code = exit.code;
                record.signal = exit.signal;
                match (exit.code, exit.signal) {
                    (Some(0), _) => record.status = RunStatus::Succeeded,
                    (Some(code), _) => {
                        record.status = RunStatus::Failed;
                        record.failure_reason = Some(format!("exited with code {code}"));
                    }
                    (None, Some(signal)) => {
                        record.status = RunStatus::Failed;
                        record.failure_reason = Some(format!("terminated by signal {signal}"));
                    }
                    (None, None) => {
                        record.status = RunStatus::Failed;
                        record.failure_reason = Some("exited without a status".to_string());
                    }
                }
            }
            RunOutcome::SpawnFailed(reason) | RunOutcome::WaitFailed(reason) => {
                record.status = RunStatus::Failed;
                record.failure_reason = Some(reason);
            }
            RunOutcome::Killed { cause, exit } => {
                record.exit_code = exit.code;
                record.signal = exit.signal;
                match cause {
                    KillCause::Memory {
                        limit_bytes,
                        observed_bytes,
                    } => {
                        record.status = RunStatus::KilledMemory;
                        record.failure_reason = Some(format!(
                            "resident memory {observed_bytes} bytes exceeded limit {limit_bytes} bytes"
                        ));
                    }
                    KillCause::Timeout { limit } => {
                        record.status = RunStatus::KilledTimeout;
                        record.failure_reason =
                            Some(format!("exceeded timeout of {}s", limit.as_secs_f64()));
                    }
                    KillCause::Shutdown => {
                        record.status = RunStatus::Failed;
                        record.failure_reason = Some("orchestrator shutdown".to_string());
                    }
                }
            }
        }

        record
    }
}
