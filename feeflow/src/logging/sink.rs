//! Append-only output files for one job.

use super::StatusLine;
use crate::config::Settings;
use crate::core::{RunRecord, SkippedTick};
use crate::job::{JobDescriptor, LogPaths};
use crate::schedule::ScheduleZone;
use crate::utils::{format_local, format_log_timestamp, Timestamp};
use chrono::Utc;
use std::io;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output.
    Stdout,
    /// Standard error.
    Stderr,
}

/// Writes a job's stdout, stderr and status lines.
///
/// Each file has its own lock so lines from concurrent writers never
/// interleave mid-line. Files are only ever appended to.
#[derive(Debug)]
pub struct JobLogSink {
    job_id: String,
    paths: LogPaths,
    date_format: String,
    zone: ScheduleZone,
    out: Mutex<File>,
    /// `None` when stderr shares the out file.
    err: Option<Mutex<File>>,
    status: Mutex<File>,
}

impl JobLogSink {
    /// Opens (creating if needed) every file of `job`.
    pub async fn open(job: &JobDescriptor, settings: &Settings) -> io::Result<Self> {
        let paths = job.log_paths().clone();
        let out = open_append(&paths.stdout_path).await?;
        let err = if paths.stderr_path == paths.stdout_path {
            None
        } else {
            Some(Mutex::new(open_append(&paths.stderr_path).await?))
        };
        let status = open_append(&paths.status_path).await?;

        Ok(Self {
            job_id: job.id().to_string(),
            paths,
            date_format: settings.log_date_format.clone(),
            zone: settings.timezone,
            out: Mutex::new(out),
            err,
            status: Mutex::new(status),
        })
    }

    /// The job this sink belongs to.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The files written by this sink.
    #[must_use]
    pub fn paths(&self) -> &LogPaths {
        &self.paths
    }

    /// Appends one line of child output, prefixed with a timestamp.
    pub async fn write_line(&self, stream: OutputStream, line: &str) -> io::Result<()> {
        let stamped = format!("{}: {line}\n", self.stamp(&Utc::now()));

        match (stream, &self.err) {
            (OutputStream::Stdout, _) | (OutputStream::Stderr, None) => {
                append(&self.out, stamped.as_bytes()).await
            }
            (OutputStream::Stderr, Some(err)) => {
                append(err, stamped.as_bytes()).await?;
                if self.paths.merged {
                    append(&self.out, stamped.as_bytes()).await?;
                }
                Ok(())
            }
        }
    }

    /// Appends the status line of a finished run.
    pub async fn write_run(&self, record: &RunRecord) -> io::Result<()> {
        self.write_status(&StatusLine::Run(record.clone())).await
    }

    /// Appends the status line of a skipped tick.
    pub async fn write_skip(&self, skip: &SkippedTick) -> io::Result<()> {
        self.write_status(&StatusLine::Skip(skip.clone())).await
    }

    async fn write_status(&self, line: &StatusLine) -> io::Result<()> {
        let mut json = line.to_json()?;
        json.push('\n');
        append(&self.status, json.as_bytes()).await
    }

    fn stamp(&self, ts: &Timestamp) -> String {
        match self.zone {
            ScheduleZone::Utc => format_log_timestamp(ts, &Utc, &self.date_format),
            ScheduleZone::Local => format_local(ts, &self.date_format),
        }
    }
}

async fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    OpenOptions::new().create(true).append(true).open(path).await
}

async fn append(file: &Mutex<File>, bytes: &[u8]) -> io::Result<()> {
    let mut file = file.lock().await;
    file.write_all(bytes).await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ActiveRun, ExitInfo, RunOutcome, SkipReason};
    use crate::job::CommandSpec;
    use crate::schedule::CronExpr;

    fn job(dir: &Path, merged: bool) -> JobDescriptor {
        let mut paths = LogPaths::in_dir(dir, "collect-fees");
        paths.merged = merged;
        JobDescriptor::new(
            "collect-fees",
            CommandSpec::new("/bin/true"),
            CronExpr::parse("*/2 * * * *").unwrap(),
        )
        .with_log_paths(paths)
    }

    fn settings() -> Settings {
        Settings {
            log_date_format: "%Y".to_string(),
            timezone: ScheduleZone::Utc,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let sink = JobLogSink::open(&job(&nested, true), &settings()).await.unwrap();

        assert!(sink.paths().stdout_path.exists());
        assert!(sink.paths().stderr_path.exists());
        assert!(sink.paths().status_path.exists());
    }

    #[tokio::test]
    async fn test_merged_stderr_lands_in_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JobLogSink::open(&job(dir.path(), true), &settings()).await.unwrap();

        sink.write_line(OutputStream::Stdout, "claimed 3 pools").await.unwrap();
        sink.write_line(OutputStream::Stderr, "rpc slow").await.unwrap();

        let out = tokio::fs::read_to_string(&sink.paths().stdout_path).await.unwrap();
        let err = tokio::fs::read_to_string(&sink.paths().stderr_path).await.unwrap();
        let year = Utc::now().format("%Y").to_string();

        assert_eq!(out, format!("{year}: claimed 3 pools\n{year}: rpc slow\n"));
        assert_eq!(err, format!("{year}: rpc slow\n"));
    }

    #[tokio::test]
    async fn test_unmerged_keeps_streams_apart() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JobLogSink::open(&job(dir.path(), false), &settings()).await.unwrap();

        sink.write_line(OutputStream::Stderr, "boom").await.unwrap();

        let out = tokio::fs::read_to_string(&sink.paths().stdout_path).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_shared_file_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = LogPaths::in_dir(dir.path(), "distribute");
        paths.stderr_path = paths.stdout_path.clone();
        let job = job(dir.path(), true).with_log_paths(paths);
        let sink = JobLogSink::open(&job, &settings()).await.unwrap();

        sink.write_line(OutputStream::Stderr, "once").await.unwrap();

        let out = tokio::fs::read_to_string(&sink.paths().stdout_path).await.unwrap();
        assert_eq!(out.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_status_lines_append() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JobLogSink::open(&job(dir.path(), true), &settings()).await.unwrap();

        let record = ActiveRun::begin("collect-fees").finish(RunOutcome::Exited(ExitInfo {
            code: Some(0),
            signal: None,
        }));
        sink.write_run(&record).await.unwrap();
        sink.write_skip(&SkippedTick::now("collect-fees", None, SkipReason::Overlap))
            .await
            .unwrap();

        let status = tokio::fs::read_to_string(&sink.paths().status_path).await.unwrap();
        let kinds: Vec<String> = status
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["kind"].to_string())
            .collect();
        assert_eq!(kinds, vec![r#""run""#, r#""skip""#]);
    }
}
