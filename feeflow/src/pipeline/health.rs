//! Stage health: the last finished run per stage.

use crate::core::{RunRecord, RunStatus};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Process-wide map from stage id to its most recent finished run.
///
/// Each stage is written only by its own job loop, so updates are single
/// entry replacements and never span more than one key. Entries are
/// never removed.
#[derive(Debug, Default)]
pub struct StageHealth {
    entries: DashMap<String, RunRecord>,
}

impl StageHealth {
    /// Creates an empty health map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finished run. Records still `running` are ignored.
    pub fn record(&self, record: &RunRecord) {
        if !record.status().is_terminal() {
            return;
        }
        self.entries
            .insert(record.job_id().to_string(), record.clone());
    }

    /// Status of the stage's last finished run.
    #[must_use]
    pub fn status(&self, stage: &str) -> Option<RunStatus> {
        self.entries.get(stage).map(|entry| entry.status())
    }

    /// The stage's last finished run.
    #[must_use]
    pub fn last_run(&self, stage: &str) -> Option<RunRecord> {
        self.entries.get(stage).map(|entry| entry.clone())
    }

    /// Current status of every stage that has finished a run.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, RunStatus> {
        self.entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status()))
            .collect()
    }
}
