//! Job descriptors: the static definition of one pipeline stage.

use super::{ByteSize, EnvOverrides};
use crate::core::RunStatus;
use crate::schedule::CronExpr;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stage id of the fee collection job.
pub const COLLECT_FEES: &str = "collect-fees";
/// Stage id of the swap job.
pub const SWAP_TOKENS: &str = "swap-tokens";
/// Stage id of the distribution job.
pub const DISTRIBUTE: &str = "distribute";

/// What happens to a job's schedule after a run finishes.
///
/// Cron fires are the only re-invocation point: no policy retries a run
/// immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Re-run on the next fire after a crash (and after a success).
    #[default]
    OnCrashOnly,
    /// Re-run on the next fire whatever happened.
    Always,
    /// Stop scheduling the job after any run that did not succeed.
    Never,
}

/// Decision taken after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    /// Keep the job on its schedule.
    Reschedule,
    /// Take the job off its schedule.
    Retire,
}

impl RestartPolicy {
    /// Decides what to do after a run that ended with `status`.
    #[must_use]
    pub fn decide(self, status: RunStatus) -> RestartDecision {
        match self {
            Self::OnCrashOnly | Self::Always => RestartDecision::Reschedule,
            Self::Never if status.is_success() => RestartDecision::Reschedule,
            Self::Never => RestartDecision::Retire,
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OnCrashOnly => write!(f, "on-crash-only"),
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
        }
    }
}

/// The executable a job runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Sets the argument list.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// The program path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Working directory of the child, if set.
    #[must_use]
    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// True when the program path is empty or blank.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.program.as_os_str().to_string_lossy().trim().is_empty()
    }

    /// Resolves the program to a concrete path.
    ///
    /// Relative paths with a separator are anchored at the working
    /// directory. Bare names are looked up on `PATH`; a name that is not
    /// found is kept as written and fails at spawn time instead.
    #[must_use]
    pub fn resolved(mut self) -> Self {
        let has_separator = self.program.components().count() > 1;
        if self.program.is_absolute() {
            return self;
        }
        if has_separator {
            if let Some(cwd) = &self.cwd {
                self.program = cwd.join(&self.program);
            }
            return self;
        }
        if let Some(found) = search_path(&self.program) {
            self.program = found;
        }
        self
    }
}

fn search_path(program: &Path) -> Option<PathBuf> {
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Where a job's output goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPaths {
    /// Stdout (and, when merged, combined) stream file.
    pub stdout_path: PathBuf,
    /// Stderr stream file.
    pub stderr_path: PathBuf,
    /// One structured line per run or skipped tick.
    pub status_path: PathBuf,
    /// Also copy stderr lines into the stdout file.
    pub merged: bool,
}

impl LogPaths {
    /// Default layout for a job under `log_dir`.
    #[must_use]
    pub fn in_dir(log_dir: &Path, job_id: &str) -> Self {
        Self {
            stdout_path: log_dir.join(format!("{job_id}-out.log")),
            stderr_path: log_dir.join(format!("{job_id}-error.log")),
            status_path: log_dir.join(format!("{job_id}-status.log")),
            merged: true,
        }
    }
}

/// Static definition of one pipeline stage.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    id: String,
    command: CommandSpec,
    schedule: CronExpr,
    memory_limit: ByteSize,
    timeout: Option<Duration>,
    restart_policy: RestartPolicy,
    env: EnvOverrides,
    log_paths: LogPaths,
    upstream: Option<String>,
}

impl JobDescriptor {
    /// Creates a descriptor with default limits and logs under `./logs`.
    #[must_use]
    pub fn new(id: impl Into<String>, command: CommandSpec, schedule: CronExpr) -> Self {
        let id = id.into();
        let log_paths = LogPaths::in_dir(Path::new("logs"), &id);
        Self {
            id,
            command,
            schedule,
            memory_limit: ByteSize::UNBOUNDED,
            timeout: None,
            restart_policy: RestartPolicy::default(),
            env: EnvOverrides::default(),
            log_paths,
            upstream: None,
        }
    }

    /// Sets the memory ceiling.
    #[must_use]
    pub fn with_memory_limit(mut self, limit: ByteSize) -> Self {
        self.memory_limit = limit;
        self
    }

    /// Sets the wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the restart policy.
    #[must_use]
    pub fn with_restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.restart_policy = policy;
        self
    }

    /// Sets the environment overrides.
    #[must_use]
    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        self.env = env;
        self
    }

    /// Sets the log destinations.
    #[must_use]
    pub fn with_log_paths(mut self, paths: LogPaths) -> Self {
        self.log_paths = paths;
        self
    }

    /// Gates this job on the last run of `upstream` succeeding.
    #[must_use]
    pub fn with_upstream(mut self, upstream: impl Into<String>) -> Self {
        self.upstream = Some(upstream.into());
        self
    }

    /// Stage id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The command to execute.
    #[must_use]
    pub fn command(&self) -> &CommandSpec {
        &self.command
    }

    /// The cron schedule.
    #[must_use]
    pub fn schedule(&self) -> &CronExpr {
        &self.schedule
    }

    /// Memory ceiling; zero means unbounded.
    #[must_use]
    pub fn memory_limit(&self) -> ByteSize {
        self.memory_limit
    }

    /// Optional wall-clock bound per run.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Restart policy.
    #[must_use]
    pub fn restart_policy(&self) -> RestartPolicy {
        self.restart_policy
    }

    /// Environment overrides.
    #[must_use]
    pub fn env(&self) -> &EnvOverrides {
        &self.env
    }

    /// Log destinations.
    #[must_use]
    pub fn log_paths(&self) -> &LogPaths {
        &self.log_paths
    }

    /// Upstream stage gating this job.
    #[must_use]
    pub fn upstream(&self) -> Option<&str> {
        self.upstream.as_deref()
    }
}
