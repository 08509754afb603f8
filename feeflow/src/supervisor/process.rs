//! Running one job execution to completion.

use super::{signal, MemoryProbe};
use crate::config::Settings;
use crate::core::{ActiveRun, ExitInfo, KillCause, RunOutcome, RunRecord};
use crate::job::JobDescriptor;
use crate::logging::{JobLogSink, OutputStream};
use crate::shutdown::ShutdownToken;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

/// Floor for the memory poll period; a zero interval would spin.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Timing knobs of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Interval between memory samples.
    pub poll_interval: Duration,
    /// Wait between SIGTERM and SIGKILL.
    pub kill_grace: Duration,
    /// How long output readers may run on after the child exits.
    pub drain_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for SupervisorConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            poll_interval: settings.memory_poll_interval,
            kill_grace: settings.kill_grace,
            drain_grace: Duration::from_secs(2),
        }
    }
}

/// Spawns job commands and turns each execution into a [`RunRecord`].
///
/// Every failure mode, including a command that cannot be spawned, ends in
/// a finished record rather than an error.
pub struct Supervisor {
    config: SupervisorConfig,
    probe: Arc<dyn MemoryProbe>,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Creates a supervisor sampling memory through `probe`.
    #[must_use]
    pub fn new(probe: Arc<dyn MemoryProbe>, config: SupervisorConfig) -> Self {
        Self { config, probe }
    }

    /// The supervisor's timing knobs.
    #[must_use]
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Runs `job` once, streaming its output into `sink`.
    pub async fn run(&self, job: &JobDescriptor, sink: Arc<JobLogSink>) -> RunRecord {
        self.supervise(ActiveRun::begin(job.id()), job, sink, &ShutdownToken::new())
            .await
    }

    /// Drives an already-begun run to its finished record.
    ///
    /// Triggering `abandon` terminates the child the same way a timeout
    /// does, and the run finishes as failed.
    pub async fn supervise(
        &self,
        mut run: ActiveRun,
        job: &JobDescriptor,
        sink: Arc<JobLogSink>,
        abandon: &ShutdownToken,
    ) -> RunRecord {
        let mut child = match build_command(job).spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(job = job.id(), command = %job.command(), error = %e, "Failed to spawn");
                return run.finish(RunOutcome::SpawnFailed(format!(
                    "failed to spawn `{}`: {e}",
                    job.command()
                )));
            }
        };

        let pid = child.id();
        run.set_pid(pid);
        let mut reaper = GroupReaper { pgid: pid };
        debug!(job = job.id(), run_id = %run.run_id(), pid = ?pid, "Spawned child");

        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(pump(stdout, Arc::clone(&sink), OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(pump(stderr, Arc::clone(&sink), OutputStream::Stderr));
        }

        let outcome = self.watch(job, &mut child, pid, &mut run, abandon).await;
        reaper.disarm();
        self.drain(job, readers).await;

        run.finish(outcome)
    }

    async fn watch(
        &self,
        job: &JobDescriptor,
        child: &mut Child,
        pid: Option<u32>,
        run: &mut ActiveRun,
        abandon: &ShutdownToken,
    ) -> RunOutcome {
        let limit = job.memory_limit();
        let mut poll = tokio::time::interval(self.config.poll_interval.max(MIN_POLL_INTERVAL));
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let timeout = job.timeout();
        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep_until(Instant::now() + limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                status = child.wait() => {
                    return match status {
                        Ok(status) => RunOutcome::Exited(ExitInfo::from_status(status)),
                        Err(e) => RunOutcome::WaitFailed(format!("failed to wait for child: {e}")),
                    };
                }
                _ = poll.tick(), if pid.is_some() => {
                    let Some(pid) = pid else { continue };
                    let Some(observed) = self.probe.resident_bytes(pid) else { continue };
                    run.observe_memory(observed);

                    if limit.is_exceeded_by(observed) {
                        warn!(
                            job = job.id(),
                            pid,
                            observed_bytes = observed,
                            limit = %limit,
                            "Memory limit exceeded; terminating"
                        );
                        let exit = self.terminate(job, child, Some(pid)).await;
                        return RunOutcome::Killed {
                            cause: KillCause::Memory { limit_bytes: limit.bytes(), observed_bytes: observed },
                            exit,
                        };
                    }
                }
                () = &mut deadline => {
                    let limit = timeout.unwrap_or_default();
                    warn!(job = job.id(), timeout_secs = limit.as_secs_f64(), "Timeout exceeded; terminating");
                    let exit = self.terminate(job, child, pid).await;
                    return RunOutcome::Killed { cause: KillCause::Timeout { limit }, exit };
                }
                () = abandon.triggered() => {
                    warn!(job = job.id(), reason = ?abandon.reason(), "Run abandoned; terminating");
                    let exit = self.terminate(job, child, pid).await;
                    return RunOutcome::Killed { cause: KillCause::Shutdown, exit };
                }
            }
        }
    }

    /// SIGTERM to the group, then SIGKILL once the grace runs out.
    async fn terminate(&self, job: &JobDescriptor, child: &mut Child, pid: Option<u32>) -> ExitInfo {
        if let Some(pid) = pid {
            if let Err(e) = signal::terminate_group(pid) {
                debug!(job = job.id(), pid, error = %e, "SIGTERM failed");
            }
        }

        match tokio::time::timeout(self.config.kill_grace, child.wait()).await {
            Ok(Ok(status)) => return ExitInfo::from_status(status),
            Ok(Err(e)) => warn!(job = job.id(), error = %e, "Wait after SIGTERM failed"),
            Err(_) => warn!(
                job = job.id(),
                grace_ms = self.config.kill_grace.as_millis() as u64,
                "Child ignored SIGTERM; killing"
            ),
        }

        if let Some(pid) = pid {
            if let Err(e) = signal::kill_group(pid) {
                debug!(job = job.id(), pid, error = %e, "SIGKILL to group failed");
            }
        }
        if let Err(e) = child.start_kill() {
            debug!(job = job.id(), error = %e, "start_kill failed");
        }

        match child.wait().await {
            Ok(status) => ExitInfo::from_status(status),
            Err(e) => {
                error!(job = job.id(), error = %e, "Could not reap killed child");
                ExitInfo::default()
            }
        }
    }

    /// Waits for output readers, abandoning them if a grandchild keeps a pipe open.
    async fn drain(&self, job: &JobDescriptor, readers: Vec<JoinHandle<()>>) {
        let aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();
        let joined = futures::future::join_all(readers);

        if tokio::time::timeout(self.config.drain_grace, joined).await.is_err() {
            warn!(job = job.id(), "Output still open after exit; detaching readers");
            for abort in aborts {
                abort.abort();
            }
        }
    }
}

/// Kills the child's process group if a run is dropped before the child
/// has been reaped.
struct GroupReaper {
    pgid: Option<u32>,
}

impl GroupReaper {
    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for GroupReaper {
    fn drop(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            if let Err(e) = signal::kill_group(pgid) {
                debug!(pgid, error = %e, "Group kill on drop failed");
            }
        }
    }
}

fn build_command(job: &JobDescriptor) -> Command {
    let spec = job.command();
    let mut command = Command::new(spec.program());
    command.args(spec.args());
    if let Some(cwd) = spec.cwd() {
        command.current_dir(cwd);
    }
    command
        .envs(job.env().resolve())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);
    command
}

fn pump<R>(reader: R, sink: Arc<JobLogSink>, stream: OutputStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let line = line.trim_end_matches(['\n', '\r']);
                    if let Err(e) = sink.write_line(stream, line).await {
                        warn!(job = sink.job_id(), error = %e, "Failed to write output line");
                    }
                }
                Err(e) => {
                    warn!(job = sink.job_id(), error = %e, "Failed to read child output");
                    break;
                }
            }
        }
    })
}
