//! Skipped ticks.

use crate::pipeline::GateBlock;
use crate::utils::Timestamp;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::RunStatus;

/// Why a tick did not start a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum SkipReason {
    /// The previous run of the same job is still in flight.
    Overlap,
    /// The upstream stage has not finished a run yet.
    UpstreamNeverRan {
        /// Upstream stage id.
        upstream: String,
    },
    /// The upstream stage's last run did not succeed.
    UpstreamUnhealthy {
        /// Upstream stage id.
        upstream: String,
        /// Status of its last run.
        status: RunStatus,
    },
}

impl From<GateBlock> for SkipReason {
    fn from(block: GateBlock) -> Self {
        match block {
            GateBlock::UpstreamNeverRan { upstream } => Self::UpstreamNeverRan { upstream },
            GateBlock::UpstreamUnhealthy { upstream, status } => {
                Self::UpstreamUnhealthy { upstream, status }
            }
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlap => write!(f, "previous run still active"),
            Self::UpstreamNeverRan { upstream } => {
                write!(f, "upstream `{upstream}` has not run yet")
            }
            Self::UpstreamUnhealthy { upstream, status } => {
                write!(f, "upstream `{upstream}` last run was {status}")
            }
        }
    }
}

/// A tick that was dropped. Never accompanied by a run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTick {
    /// The job whose tick was dropped.
    pub job_id: String,
    /// When the skip was decided.
    pub at: Timestamp,
    /// Fire time of the tick; `None` for manual invocations.
    pub scheduled_for: Option<Timestamp>,
    /// Why it was dropped.
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl SkippedTick {
    /// Creates a skip stamped with the current time.
    #[must_use]
    pub fn now(
        job_id: impl Into<String>,
        scheduled_for: Option<Timestamp>,
        reason: SkipReason,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            at: Utc::now(),
            scheduled_for,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_serializes_flat() {
        let skip = SkippedTick::now(
            "swap-tokens",
            None,
            SkipReason::UpstreamUnhealthy {
                upstream: "collect-fees".to_string(),
                status: RunStatus::Failed,
            },
        );
        let json = serde_json::to_value(&skip).unwrap();
        assert_eq!(json["reason"], "upstream-unhealthy");
        assert_eq!(json["upstream"], "collect-fees");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["job_id"], "swap-tokens");
    }

    #[test]
    fn test_gate_block_conversion() {
        let reason: SkipReason = GateBlock::UpstreamNeverRan {
            upstream: "collect-fees".to_string(),
        }
        .into();
        assert_eq!(reason.to_string(), "upstream `collect-fees` has not run yet");
    }
}
