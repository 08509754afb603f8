//! The timer loop of one job.

use super::{JobSlot, Orchestrator, TickOutcome};
use crate::job::RestartDecision;
use crate::schedule::CronTrigger;
use crate::shutdown::ShutdownToken;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Extra time abandoned runs get to write their records after SIGKILL.
const ABANDON_SLACK: Duration = Duration::from_secs(5);

/// Waits for each fire of `slot`'s schedule and hands it to a fresh task.
///
/// Returns when shutdown is triggered, the job retires, or the schedule
/// has no future fire. In-flight runs are then given the shutdown grace.
pub(crate) async fn run(orchestrator: Arc<Orchestrator>, slot: JobSlot, shutdown: ShutdownToken) {
    let job_id = slot.job.id().to_string();
    let span = info_span!("job", job = %job_id);

    async move {
        let mut trigger = CronTrigger::new(slot.job.schedule().clone(), orchestrator.settings().timezone);
        let retired = Arc::new(AtomicBool::new(false));
        let mut in_flight = JoinSet::new();

        if let Some(next) = trigger.peek_next(chrono::Utc::now()) {
            info!(schedule = %slot.job.schedule(), next_fire = %next, "Scheduled");
        }

        loop {
            let fire = tokio::select! {
                fire = trigger.wait_next() => fire,
                () = shutdown.triggered() => break,
            };
            let Some(fire) = fire else {
                warn!(schedule = %slot.job.schedule(), "Schedule has no future fire; stopping");
                break;
            };

            reap(&mut in_flight);
            if retired.load(Ordering::SeqCst) {
                break;
            }

            debug!(scheduled_for = %fire, "Tick");
            let orchestrator = Arc::clone(&orchestrator);
            let slot = slot.clone();
            let retired = Arc::clone(&retired);
            in_flight.spawn(
                async move {
                    let outcome = orchestrator.fire(&slot, Some(fire), true).await;
                    if let TickOutcome::Ran {
                        decision: RestartDecision::Retire,
                        ..
                    } = outcome
                    {
                        if !retired.swap(true, Ordering::SeqCst) {
                            orchestrator.retire(&slot.job).await;
                        }
                    }
                }
                .in_current_span(),
            );
        }

        drain(&orchestrator, &mut in_flight, &shutdown).await;
        debug!("Job loop stopped");
    }
    .instrument(span)
    .await;
}

/// Collects finished tick tasks without blocking.
fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(Some(joined)) = in_flight.join_next().now_or_never() {
        if let Err(e) = joined {
            error!(error = %e, "Tick task panicked");
        }
    }
}

/// Waits for in-flight runs. Once shutdown is requested they get
/// `shutdown_grace`, after which their children are terminated and the
/// runs finish as failed.
async fn drain(orchestrator: &Orchestrator, in_flight: &mut JoinSet<()>, shutdown: &ShutdownToken) {
    if in_flight.is_empty() {
        return;
    }

    tokio::select! {
        () = join_all(in_flight) => return,
        () = shutdown.triggered() => {}
    }

    let settings = orchestrator.settings();
    let grace = settings.shutdown_grace;
    info!(runs = in_flight.len(), grace_ms = grace.as_millis() as u64, "Waiting for in-flight runs");
    if tokio::time::timeout(grace, join_all(in_flight)).await.is_ok() {
        return;
    }

    warn!(runs = in_flight.len(), "Shutdown grace elapsed; terminating in-flight runs");
    orchestrator.abandon_runs();

    // The supervisor bounds termination and the output drain.
    let bound = settings.kill_grace + ABANDON_SLACK;
    if tokio::time::timeout(bound, join_all(in_flight)).await.is_err() {
        error!(runs = in_flight.len(), "In-flight runs did not finish; aborting");
        in_flight.abort_all();
        join_all(in_flight).await;
    }
}

async fn join_all(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                error!(error = %e, "Tick task panicked");
            }
        }
    }
}
