//! Core run types: status, records and skipped ticks.

mod record;
mod skip;
mod status;

pub use record::{ActiveRun, ExitInfo, KillCause, RunOutcome, RunRecord};
pub use skip::{SkipReason, SkippedTick};
pub use status::RunStatus;
