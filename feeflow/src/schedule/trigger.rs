//! Per-job cron trigger.

use super::CronExpr;
use crate::utils::Timestamp;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Longest single sleep between wall-clock checks.
///
/// The trigger wakes at least this often so a stepped system clock moves
/// the next fire instead of silently stretching the interval.
const MAX_SLEEP: Duration = Duration::from_secs(30);

/// Wall clock the cron fields are evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleZone {
    /// The host's local time zone.
    #[default]
    Local,
    /// UTC.
    Utc,
}

impl ScheduleZone {
    /// Next fire of `expr` strictly after `after`, as a UTC instant.
    #[must_use]
    pub fn next_after(self, expr: &CronExpr, after: Timestamp) -> Option<Timestamp> {
        match self {
            Self::Utc => expr.next_after(&after),
            Self::Local => expr
                .next_after(&after.with_timezone(&Local))
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

/// Emits ticks for one job's schedule.
///
/// Missed fires are never replayed: every wait computes the next fire from
/// the later of the current time and the previous fire.
#[derive(Debug, Clone)]
pub struct CronTrigger {
    expr: CronExpr,
    zone: ScheduleZone,
    last_fire: Option<Timestamp>,
}

impl CronTrigger {
    /// Creates a trigger for an expression in a zone.
    #[must_use]
    pub fn new(expr: CronExpr, zone: ScheduleZone) -> Self {
        Self {
            expr,
            zone,
            last_fire: None,
        }
    }

    /// The schedule expression.
    #[must_use]
    pub fn expr(&self) -> &CronExpr {
        &self.expr
    }

    /// The most recent fire time handed out.
    #[must_use]
    pub fn last_fire(&self) -> Option<Timestamp> {
        self.last_fire
    }

    /// Computes the fire that follows `now` without advancing the trigger.
    #[must_use]
    pub fn peek_next(&self, now: Timestamp) -> Option<Timestamp> {
        let reference = self.last_fire.map_or(now, |last| last.max(now));
        self.zone.next_after(&self.expr, reference)
    }

    /// Upcoming fire times after `now`.
    #[must_use]
    pub fn preview(&self, now: Timestamp, count: usize) -> Vec<Timestamp> {
        let mut fires = Vec::with_capacity(count);
        let mut cursor = now;
        while fires.len() < count {
            match self.zone.next_after(&self.expr, cursor) {
                Some(next) => {
                    fires.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        fires
    }

    /// Sleeps until the next fire and returns its scheduled instant.
    ///
    /// Returns `None` if the expression has no future fire.
    pub async fn wait_next(&mut self) -> Option<Timestamp> {
        let next = self.peek_next(Utc::now())?;
        debug!(schedule = %self.expr, next_fire = %next, "Waiting for next fire");

        loop {
            let remaining = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(remaining.min(MAX_SLEEP)).await;
        }

        self.last_fire = Some(next);
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn trigger(expr: &str) -> CronTrigger {
        CronTrigger::new(CronExpr::parse(expr).unwrap(), ScheduleZone::Utc)
    }

    #[test]
    fn test_preview_every_two_minutes() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let fires = trigger("*/2 * * * *").preview(t, 3);
        assert_eq!(
            fires,
            vec![
                t + chrono::Duration::minutes(2),
                t + chrono::Duration::minutes(4),
                t + chrono::Duration::minutes(6),
            ]
        );
    }

    #[test]
    fn test_peek_next_does_not_backfill() {
        let mut trig = trigger("*/2 * * * *");
        trig.last_fire = Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap());
        // The process was away for ten minutes; only the next future fire counts.
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 11, 30).unwrap();
        assert_eq!(
            trig.peek_next(now),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 12, 0).unwrap())
        );
    }

    #[test]
    fn test_peek_next_is_after_last_fire() {
        let mut trig = trigger("*/2 * * * *");
        let fire = Utc.with_ymd_and_hms(2024, 5, 1, 10, 2, 0).unwrap();
        trig.last_fire = Some(fire);
        // A clock reading slightly behind the last fire must not repeat it.
        let now = fire - chrono::Duration::milliseconds(5);
        assert_eq!(trig.peek_next(now), Some(fire + chrono::Duration::minutes(2)));
    }

    #[tokio::test]
    async fn test_wait_next_fires_on_second_schedule() {
        let mut trig = trigger("* * * * * *");
        let before = Utc::now();
        let first = trig.wait_next().await.unwrap();
        let second = trig.wait_next().await.unwrap();

        assert!(first > before);
        assert!(Utc::now() >= second);
        assert_eq!(second - first, chrono::Duration::seconds(1));
        assert_eq!(trig.last_fire(), Some(second));
    }

    #[test]
    fn test_zone_serde() {
        let zone: ScheduleZone = serde_json::from_str(r#""utc""#).unwrap();
        assert_eq!(zone, ScheduleZone::Utc);
        assert_eq!(ScheduleZone::default(), ScheduleZone::Local);
    }
}
