//! Assertions over tick outcomes and status files.

use crate::core::{RunRecord, RunStatus, SkipReason};
use crate::logging::StatusLine;
use crate::orchestrator::TickOutcome;
use std::path::Path;

/// Asserts the tick ran a child that ended with `expected`.
pub fn assert_ran_with_status(outcome: &TickOutcome, expected: RunStatus) -> &RunRecord {
    match outcome {
        TickOutcome::Ran { record, .. } => {
            assert_eq!(
                record.status(),
                expected,
                "Expected {expected} for {}, got {} ({:?})",
                record.job_id(),
                record.status(),
                record.failure_reason()
            );
            record
        }
        TickOutcome::Skipped(skip) => {
            panic!("Expected a {expected} run of {}, tick was skipped: {}", skip.job_id, skip.reason)
        }
    }
}

/// Asserts the tick was skipped for `expected`.
pub fn assert_skipped(outcome: &TickOutcome, expected: &SkipReason) {
    match outcome {
        TickOutcome::Skipped(skip) => assert_eq!(&skip.reason, expected),
        TickOutcome::Ran { record, .. } => {
            panic!("Expected skip ({expected}), but {} ran: {}", record.job_id(), record.status())
        }
    }
}

/// Parses every line of a status file.
pub fn read_status_lines(path: &Path) -> Vec<StatusLine> {
    let contents = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {e}", path.display()));
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str(line)
                .unwrap_or_else(|e| panic!("Bad status line {line:?}: {e}"))
        })
        .collect()
}
