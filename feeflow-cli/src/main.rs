use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use feeflow::config::{resolve_config_path, JobTable, Settings};
use feeflow::core::RunStatus;
use feeflow::events::LoggingEventSink;
use feeflow::logging::{read_last_status, StatusLine};
use feeflow::orchestrator::{Orchestrator, TickOutcome};
use feeflow::schedule::{CronTrigger, ScheduleZone};
use feeflow::shutdown::ShutdownToken;
use feeflow::supervisor::default_probe;
use feeflow::utils::{format_local, format_log_timestamp, Timestamp};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "feeflow")]
#[command(about = "Cron-driven supervisor for the collect/swap/distribute pipeline")]
#[command(version)]
struct Cli {
    /// Job table file (falls back to FEEFLOW_CONFIG, then ./feeflow.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use the built-in three-stage pipeline with executables from this directory
    #[arg(long, global = true, conflicts_with = "config")]
    bin_dir: Option<PathBuf>,

    /// Log directory for the built-in pipeline
    #[arg(long, global = true, default_value = "./logs", requires = "bin_dir")]
    log_dir: PathBuf,

    /// Format of feeflow's own diagnostics on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Schedule every job until SIGINT or SIGTERM
    Run,
    /// Load and validate the job table, then print it
    Validate,
    /// Print upcoming fire times of a job
    Next {
        /// Job id
        job: String,
        /// How many fire times to print
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
    },
    /// Run one job immediately through the run lock and the upstream gate
    Once {
        /// Job id
        job: String,
        /// Run even if the upstream stage has not succeeded
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Print the last status line of every job
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_format) {
        eprintln!("feeflow: failed to initialise logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "feeflow failed");
            ExitCode::FAILURE
        }
    }
}

/// Filter used when `RUST_LOG` is unset or unparsable.
const DEFAULT_FILTER: &str = "feeflow=info";

fn init_tracing(format: LogFormat) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}

/// `RUST_LOG` wins over the default when it holds a valid directive set.
fn env_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

async fn dispatch(cli: Cli) -> Result<ExitCode> {
    let table = load_table(&cli)?;

    match cli.command {
        Commands::Run => run(table).await,
        Commands::Validate => {
            validate(&table);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Next { job, count } => next(&table, &job, count),
        Commands::Once { job, force } => once(table, &job, force).await,
        Commands::Status => status(&table).await,
    }
}

fn load_table(cli: &Cli) -> Result<JobTable> {
    if let Some(bin_dir) = &cli.bin_dir {
        info!(bin_dir = %bin_dir.display(), "Using the built-in revenue pipeline");
        return JobTable::revenue_pipeline(bin_dir, &cli.log_dir)
            .context("invalid built-in pipeline");
    }

    let path = resolve_config_path(cli.config.as_deref())?;
    JobTable::load(&path).with_context(|| format!("invalid job table {}", path.display()))
}

async fn run(table: JobTable) -> Result<ExitCode> {
    let orchestrator = Orchestrator::with_parts(
        table,
        default_probe(),
        Arc::new(LoggingEventSink::default()),
    )
    .await?;
    let orchestrator = Arc::new(orchestrator);

    let shutdown = ShutdownToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    orchestrator.run_until(shutdown).await;
    Ok(ExitCode::SUCCESS)
}

async fn watch_signals(shutdown: ShutdownToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM; only Ctrl-C stops feeflow");
                if tokio::signal::ctrl_c().await.is_ok() {
                    shutdown.trigger("SIGINT");
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => shutdown.trigger("SIGINT"),
            _ = term.recv() => shutdown.trigger("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.trigger("ctrl-c");
        }
    }

    info!(reason = ?shutdown.reason(), "Shutdown requested");
}

fn validate(table: &JobTable) {
    let settings = table.settings();
    println!(
        "timezone={} gate_on_upstream={} date_format={:?}",
        zone_name(settings.timezone),
        settings.gate_on_upstream,
        settings.log_date_format
    );

    for job in table.jobs() {
        let trigger = CronTrigger::new(job.schedule().clone(), settings.timezone);
        let next = trigger
            .peek_next(Utc::now())
            .map_or_else(|| "never".to_string(), |ts| render(&ts, settings));

        println!("{}", job.id());
        println!("  command:  {}", job.command());
        println!("  schedule: {} (next {next})", job.schedule());
        println!("  memory:   {}", job.memory_limit());
        if let Some(timeout) = job.timeout() {
            println!("  timeout:  {}s", timeout.as_secs());
        }
        println!("  restart:  {}", job.restart_policy());
        if let Some(upstream) = job.upstream() {
            println!("  upstream: {upstream}");
        }
        println!("  out:      {}", job.log_paths().stdout_path.display());
        println!("  error:    {}", job.log_paths().stderr_path.display());
        println!("  status:   {}", job.log_paths().status_path.display());
    }
}

fn next(table: &JobTable, job_id: &str, count: usize) -> Result<ExitCode> {
    let Some(job) = table.get(job_id) else {
        bail!("unknown job `{job_id}`");
    };

    let settings = table.settings();
    let trigger = CronTrigger::new(job.schedule().clone(), settings.timezone);
    for fire in trigger.preview(Utc::now(), count) {
        println!("{}", render(&fire, settings));
    }
    Ok(ExitCode::SUCCESS)
}

async fn once(table: JobTable, job_id: &str, force: bool) -> Result<ExitCode> {
    let orchestrator = Orchestrator::from_table(table).await?;
    let outcome = orchestrator.run_now(job_id, force).await?;

    let line = match &outcome {
        TickOutcome::Ran { record, .. } => StatusLine::Run(record.clone()),
        TickOutcome::Skipped(skip) => StatusLine::Skip(skip.clone()),
    };
    println!("{}", line.to_json()?);

    let succeeded = outcome
        .record()
        .is_some_and(|record| record.status() == RunStatus::Succeeded);
    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn status(table: &JobTable) -> Result<ExitCode> {
    for job in table.jobs() {
        let path = &job.log_paths().status_path;
        let last = read_last_status(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;

        match last {
            None => println!("{}: no runs recorded", job.id()),
            Some(line) => println!("{}: {}", job.id(), line.to_json()?),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn render(ts: &Timestamp, settings: &Settings) -> String {
    match settings.timezone {
        ScheduleZone::Utc => format_log_timestamp(ts, &Utc, &settings.log_date_format),
        ScheduleZone::Local => format_local(ts, &settings.log_date_format),
    }
}

fn zone_name(zone: ScheduleZone) -> &'static str {
    match zone {
        ScheduleZone::Utc => "utc",
        ScheduleZone::Local => "local",
    }
}
