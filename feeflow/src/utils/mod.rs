//! Utility functions for timestamp handling.

pub mod timestamps;

pub use timestamps::{
    format_local, format_log_timestamp, is_valid_date_format, Timestamp, DEFAULT_LOG_DATE_FORMAT,
};
