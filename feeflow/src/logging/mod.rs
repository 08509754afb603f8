//! Per-job log and status files.

mod sink;
mod status;

pub use sink::{JobLogSink, OutputStream};
pub use status::{read_last_status, StatusLine};
