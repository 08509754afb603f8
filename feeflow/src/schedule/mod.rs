//! Cron scheduling.
//!
//! [`CronExpr`] turns an expression into fire times; [`CronTrigger`] turns
//! fire times into ticks for one job.

mod cron;
mod trigger;

pub use cron::{CronExpr, CronField, CronParseError, Upcoming};
pub use trigger::{CronTrigger, ScheduleZone};
