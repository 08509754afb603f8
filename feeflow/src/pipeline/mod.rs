//! Pipeline ordering, stage health and the upstream gate.

mod coordinator;
mod health;
mod order;

pub use coordinator::{GateBlock, PipelineCoordinator};
pub use health::StageHealth;
pub use order::stage_order;
