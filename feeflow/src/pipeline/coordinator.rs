//! Pipeline coordinator: the upstream-success gate between stages.

use super::{stage_order, StageHealth};
use crate::core::{RunRecord, RunStatus};
use crate::errors::ConfigError;
use crate::job::JobDescriptor;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;

/// Why a stage may not run on this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateBlock {
    /// The upstream stage has not finished a run since startup.
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

impl fmt::Display for GateBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamNeverRan { upstream } => {
                write!(f, "upstream `{upstream}` has not run yet")
            }
            Self::UpstreamUnhealthy { upstream, status } => {
                write!(f, "upstream `{upstream}` last run was {status}")
            }
        }
    }
}

/// Decides whether a stage is eligible from its upstream's last outcome.
///
/// The gate is advisory per tick: a blocked tick is dropped and the next
/// tick asks again.
#[derive(Debug)]
pub struct PipelineCoordinator {
    upstreams: HashMap<String, Option<String>>,
    order: Vec<String>,
    health: StageHealth,
    gate_enabled: bool,
}

impl PipelineCoordinator {
    /// Builds a coordinator from job descriptors.
    pub fn new<'a, I>(jobs: I, gate_enabled: bool) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = &'a JobDescriptor>,
    {
        let links: BTreeMap<String, Option<String>> = jobs
            .into_iter()
            .map(|job| (job.id().to_string(), job.upstream().map(str::to_string)))
            .collect();
        let order = stage_order(&links)?;

        Ok(Self {
            upstreams: links.into_iter().collect(),
            order,
            health: StageHealth::new(),
            gate_enabled,
        })
    }

    /// Checks whether `stage` may run now.
    ///
    /// Roots are always eligible. A gated stage is eligible only when its
    /// upstream's most recent finished run succeeded.
    pub fn may_run(&self, stage: &str) -> Result<(), GateBlock> {
        if !self.gate_enabled {
            return Ok(());
        }
        let Some(Some(upstream)) = self.upstreams.get(stage) else {
            return Ok(());
        };

        match self.health.status(upstream) {
            Some(RunStatus::Succeeded) => Ok(()),
            Some(status) => Err(GateBlock::UpstreamUnhealthy {
                upstream: upstream.clone(),
                status,
            }),
            None => Err(GateBlock::UpstreamNeverRan {
                upstream: upstream.clone(),
            }),
        }
    }

    /// Boolean form of [`may_run`](Self::may_run).
    #[must_use]
    pub fn is_eligible(&self, stage: &str) -> bool {
        self.may_run(stage).is_ok()
    }

    /// Records a finished run into stage health.
    pub fn record(&self, record: &RunRecord) {
        debug!(stage = %record.job_id(), status = %record.status(), "Stage health updated");
        self.health.record(record);
    }

    /// Stage health.
    #[must_use]
    pub fn health(&self) -> &StageHealth {
        &self.health
    }

    /// Stages in upstream-first order.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// The upstream gating `stage`, if any.
    #[must_use]
    pub fn upstream_of(&self, stage: &str) -> Option<&str> {
        self.upstreams.get(stage).and_then(|up| up.as_deref())
    }

    /// Whether the upstream gate is active.
    #[must_use]
    pub fn gate_enabled(&self) -> bool {
        self.gate_enabled
    }
}
