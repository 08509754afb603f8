//! Testing utilities for feeflow pipelines.
//!
//! This module provides:
//! - Shell-script job fixtures with their own log directory
//! - Memory probes with scripted samples
//! - Assertions over tick outcomes and status files

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_ran_with_status, assert_skipped, read_status_lines};
pub use fixtures::{fast_settings, script_job, TestPipeline};
pub use mocks::{FixedProbe, SequenceProbe};
