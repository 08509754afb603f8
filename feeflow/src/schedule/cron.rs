//! Cron expression parsing and fire-time computation.
//!
//! Accepts the classic five-field form (`minute hour day-of-month month
//! day-of-week`) and a six-field form with a leading seconds field. Fire
//! times are computed on the wall clock of whatever [`TimeZone`] the
//! reference instant carries.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// How far ahead the fire-time search looks before giving up.
///
/// Eight years covers leap-day schedules combined with a weekday filter.
const SEARCH_HORIZON_YEARS: i32 = 8;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const WEEKDAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
const MAX_DAYS_IN_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// Errors produced while parsing a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronParseError {
    /// The expression is empty.
    #[error("empty cron expression")]
    Empty,

    /// Wrong number of whitespace-separated fields.
    #[error("expected 5 or 6 fields, found {0}")]
    FieldCount(usize),

    /// An `@macro` that is not supported.
    #[error("unknown schedule macro `{0}`")]
    UnknownMacro(String),

    /// A token that is neither a number nor a known name.
    #[error("invalid value `{value}` in {field} field")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending token.
        value: String,
    },

    /// A value outside the field's range.
    #[error("{value} is out of range {min}-{max} for {field} field")]
    OutOfRange {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: u32,
        /// Smallest allowed value.
        min: u32,
        /// Largest allowed value.
        max: u32,
    },

    /// A range whose start exceeds its end.
    #[error("range {start}-{end} is reversed in {field} field")]
    ReversedRange {
        /// Field name.
        field: &'static str,
        /// Range start.
        start: u32,
        /// Range end.
        end: u32,
    },

    /// A step of zero or a non-numeric step.
    #[error("invalid step `{step}` in {field} field")]
    InvalidStep {
        /// Field name.
        field: &'static str,
        /// Offending step.
        step: String,
    },

    /// The expression parses but can never match a calendar date.
    #[error("expression `{0}` never fires")]
    NeverFires(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Offset added to a name's index to obtain its value.
    name_base: u32,
}

const SECONDS: FieldSpec = FieldSpec { name: "seconds", min: 0, max: 59, names: &[], name_base: 0 };
const MINUTES: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59, names: &[], name_base: 0 };
const HOURS: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23, names: &[], name_base: 0 };
const DAYS_OF_MONTH: FieldSpec =
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], name_base: 0 };
const MONTHS: FieldSpec =
    FieldSpec { name: "month", min: 1, max: 12, names: &MONTH_NAMES, name_base: 1 };
// 7 is accepted as an alias for Sunday and folded onto 0.
const DAYS_OF_WEEK: FieldSpec =
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: &WEEKDAY_NAMES, name_base: 0 };

/// A set of allowed values for one cron field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CronField(u64);

impl CronField {
    fn insert(&mut self, value: u32) {
        self.0 |= 1u64 << value;
    }

    /// Returns true if `value` is allowed.
    #[must_use]
    pub fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }

    /// Smallest allowed value that is `>= from`.
    #[must_use]
    pub fn next_from(&self, from: u32) -> Option<u32> {
        if from >= 64 {
            return None;
        }
        let masked = self.0 & (u64::MAX << from);
        (masked != 0).then(|| masked.trailing_zeros())
    }

    /// Smallest allowed value.
    #[must_use]
    pub fn first(&self) -> Option<u32> {
        self.next_from(0)
    }

    fn parse(raw: &str, spec: FieldSpec) -> Result<Self, CronParseError> {
        let mut field = Self::default();
        for part in raw.split(',') {
            let (base, step) = match part.split_once('/') {
                Some((base, step)) => {
                    let step: u32 = step
                        .parse()
                        .ok()
                        .filter(|s| *s > 0)
                        .ok_or_else(|| CronParseError::InvalidStep {
                            field: spec.name,
                            step: step.to_string(),
                        })?;
                    (base, Some(step))
                }
                None => (part, None),
            };

            let (start, end) = if base == "*" {
                (spec.min, spec.max)
            } else if let Some((lo, hi)) = base.split_once('-') {
                let lo = parse_value(lo, spec)?;
                let hi = parse_value(hi, spec)?;
                if lo > hi {
                    return Err(CronParseError::ReversedRange {
                        field: spec.name,
                        start: lo,
                        end: hi,
                    });
                }
                (lo, hi)
            } else {
                let value = parse_value(base, spec)?;
                // `n/step` means "from n to the end of the range".
                if step.is_some() {
                    (value, spec.max)
                } else {
                    (value, value)
                }
            };

            let step = step.unwrap_or(1);
            let mut value = start;
            while value <= end {
                field.insert(value);
                let Some(next) = value.checked_add(step) else {
                    break;
                };
                value = next;
            }
        }

        if spec == DAYS_OF_WEEK && field.contains(7) {
            field.0 &= !(1u64 << 7);
            field.insert(0);
        }

        Ok(field)
    }
}

fn parse_value(token: &str, spec: FieldSpec) -> Result<u32, CronParseError> {
    let lowered = token.to_ascii_lowercase();
    if let Some(idx) = spec.names.iter().position(|name| *name == lowered) {
        return Ok(idx as u32 + spec.name_base);
    }

    let value: u32 = token.parse().map_err(|_| CronParseError::InvalidValue {
        field: spec.name,
        value: token.to_string(),
    })?;

    if value < spec.min || value > spec.max {
        return Err(CronParseError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

fn expand_macro(expr: &str) -> Result<&'static str, CronParseError> {
    match expr.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => Ok("0 0 1 1 *"),
        "@monthly" => Ok("0 0 1 * *"),
        "@weekly" => Ok("0 0 * * 0"),
        "@daily" | "@midnight" => Ok("0 0 * * *"),
        "@hourly" => Ok("0 * * * *"),
        _ => Err(CronParseError::UnknownMacro(expr.to_string())),
    }
}

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    source: String,
    has_seconds: bool,
    seconds: CronField,
    minutes: CronField,
    hours: CronField,
    days_of_month: CronField,
    months: CronField,
    days_of_week: CronField,
    // Vixie cron: a field written as `*...` does not take part in the
    // day-of-month / day-of-week OR rule.
    dom_starred: bool,
    dow_starred: bool,
}

impl CronExpr {
    /// Parses a cron expression.
    pub fn parse(expr: &str) -> Result<Self, CronParseError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(CronParseError::Empty);
        }

        let body = if trimmed.starts_with('@') {
            expand_macro(trimmed)?
        } else {
            trimmed
        };

        let fields: Vec<&str> = body.split_whitespace().collect();
        let (has_seconds, rest) = match fields.len() {
            5 => (false, &fields[..]),
            6 => (true, &fields[1..]),
            n => return Err(CronParseError::FieldCount(n)),
        };

        let seconds = if has_seconds {
            CronField::parse(fields[0], SECONDS)?
        } else {
            let mut only_zero = CronField::default();
            only_zero.insert(0);
            only_zero
        };

        let parsed = Self {
            source: trimmed.to_string(),
            has_seconds,
            seconds,
            minutes: CronField::parse(rest[0], MINUTES)?,
            hours: CronField::parse(rest[1], HOURS)?,
            days_of_month: CronField::parse(rest[2], DAYS_OF_MONTH)?,
            months: CronField::parse(rest[3], MONTHS)?,
            days_of_week: CronField::parse(rest[4], DAYS_OF_WEEK)?,
            dom_starred: rest[2].starts_with('*'),
            dow_starred: rest[4].starts_with('*'),
        };

        if !parsed.can_fire() {
            return Err(CronParseError::NeverFires(trimmed.to_string()));
        }
        Ok(parsed)
    }

    /// The expression as written.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the expression carries a seconds field.
    #[must_use]
    pub fn has_seconds(&self) -> bool {
        self.has_seconds
    }

    /// Smallest unit the schedule can distinguish.
    #[must_use]
    pub fn granularity(&self) -> std::time::Duration {
        if self.has_seconds {
            std::time::Duration::from_secs(1)
        } else {
            std::time::Duration::from_secs(60)
        }
    }

    /// Rejects dates such as `30 2` (February 30th) that no calendar has.
    fn can_fire(&self) -> bool {
        // With a weekday filter in play some day will always match.
        if !self.dom_starred && !self.dow_starred {
            return true;
        }
        (1..=12u32).filter(|m| self.months.contains(*m)).any(|m| {
            self.days_of_month
                .first()
                .is_some_and(|d| d <= MAX_DAYS_IN_MONTH[(m - 1) as usize])
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self.days_of_week.contains(date.weekday().num_days_from_sunday());
        if self.dom_starred || self.dow_starred {
            dom && dow
        } else {
            dom || dow
        }
    }

    /// Earliest naive wall-clock time `>= start` that matches the fields.
    fn next_naive(&self, start: NaiveDateTime) -> Option<NaiveDateTime> {
        let horizon = start.year() + SEARCH_HORIZON_YEARS;
        let mut cursor = start;

        loop {
            if cursor.year() > horizon {
                return None;
            }

            let date = cursor.date();
            if !self.months.contains(date.month()) {
                cursor = first_of_next_month(date)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(date) {
                cursor = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }

            let Some(hour) = self.hours.next_from(cursor.hour()) else {
                cursor = date.succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            };
            if hour != cursor.hour() {
                cursor = date.and_hms_opt(hour, 0, 0)?;
            }

            let Some(minute) = self.minutes.next_from(cursor.minute()) else {
                cursor = date.and_hms_opt(hour, 0, 0)? + Duration::hours(1);
                continue;
            };
            if minute != cursor.minute() {
                cursor = date.and_hms_opt(hour, minute, 0)?;
            }

            let Some(second) = self.seconds.next_from(cursor.second()) else {
                cursor = date.and_hms_opt(hour, minute, 0)? + Duration::minutes(1);
                continue;
            };
            return date.and_hms_opt(hour, minute, second);
        }
    }

    /// Earliest fire time strictly after `after`.
    ///
    /// Local times skipped by a DST gap never fire. A repeated local time
    /// fires once, at its earliest mapping, and not at all if that mapping
    /// is not after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let mut start = after.naive_local().with_nanosecond(0)? + Duration::seconds(1);

        loop {
            let candidate = self.next_naive(start)?;
            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(dt) if dt > *after => return Some(dt),
                LocalResult::Ambiguous(early, _) if early > *after => return Some(early),
                _ => {}
            }
            start = candidate + Duration::seconds(1);
        }
    }

    /// Earliest fire time at or after `at`.
    pub fn next_at_or_after<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.next_after(&(at.clone() - Duration::nanoseconds(1)))
    }

    /// Iterator over successive fire times strictly after `after`.
    #[must_use]
    pub fn upcoming<Tz: TimeZone>(&self, after: DateTime<Tz>) -> Upcoming<'_, Tz> {
        Upcoming {
            expr: self,
            cursor: Some(after),
        }
    }
}

fn first_of_next_month(date: NaiveDate) -> Option<NaiveDate> {
    if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    }
}

impl FromStr for CronExpr {
    type Err = CronParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CronExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Strictly increasing fire times of a [`CronExpr`].
#[derive(Debug)]
pub struct Upcoming<'a, Tz: TimeZone> {
    expr: &'a CronExpr,
    cursor: Option<DateTime<Tz>>,
}

impl<Tz: TimeZone> Iterator for Upcoming<'_, Tz> {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<Self::Item> {
        let after = self.cursor.take()?;
        let next = self.expr.next_after(&after)?;
        self.cursor = Some(next.clone());
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};
    use pretty_assertions::assert_eq;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_every_two_minutes_from_aligned_start() {
        let expr = CronExpr::parse("*/2 * * * *").unwrap();
        let start = utc(2024, 5, 1, 10, 0, 0);
        let fires: Vec<_> = expr.upcoming(start).take(4).collect();
        assert_eq!(
            fires,
            vec![
                utc(2024, 5, 1, 10, 2, 0),
                utc(2024, 5, 1, 10, 4, 0),
                utc(2024, 5, 1, 10, 6, 0),
                utc(2024, 5, 1, 10, 8, 0),
            ]
        );
    }

    #[test]
    fn test_next_after_is_strict() {
        let expr = CronExpr::parse("*/5 * * * *").unwrap();
        let at = utc(2024, 5, 1, 10, 5, 0);
        assert_eq!(expr.next_after(&at), Some(utc(2024, 5, 1, 10, 10, 0)));
        assert_eq!(expr.next_at_or_after(&at), Some(at));
    }

    #[test]
    fn test_sub_second_reference_rounds_forward() {
        let expr = CronExpr::parse("*/2 * * * *").unwrap();
        let at = utc(2024, 5, 1, 10, 1, 59) + Duration::milliseconds(999);
        assert_eq!(expr.next_after(&at), Some(utc(2024, 5, 1, 10, 2, 0)));
    }

    #[test]
    fn test_fire_times_strictly_increase() {
        let expr = CronExpr::parse("0,30 9-17 * * mon-fri").unwrap();
        let fires: Vec<_> = expr.upcoming(utc(2024, 1, 1, 0, 0, 0)).take(200).collect();
        assert!(fires.windows(2).all(|w| w[0] < w[1]));
        assert!(fires
            .iter()
            .all(|f| (1..=5).contains(&f.weekday().num_days_from_sunday())));
    }

    #[test]
    fn test_hour_and_day_rollover() {
        let expr = CronExpr::parse("15 3 * * *").unwrap();
        assert_eq!(
            expr.next_after(&utc(2024, 12, 31, 4, 0, 0)),
            Some(utc(2025, 1, 1, 3, 15, 0))
        );
    }

    #[test]
    fn test_six_field_seconds() {
        let expr = CronExpr::parse("*/10 * * * * *").unwrap();
        assert!(expr.has_seconds());
        assert_eq!(expr.granularity(), std::time::Duration::from_secs(1));
        assert_eq!(
            expr.next_after(&utc(2024, 5, 1, 10, 0, 55)),
            Some(utc(2024, 5, 1, 10, 1, 0))
        );
    }

    #[test]
    fn test_month_and_weekday_names() {
        let expr = CronExpr::parse("0 0 1 JAN,jul *").unwrap();
        assert_eq!(
            expr.next_after(&utc(2024, 2, 1, 0, 0, 0)),
            Some(utc(2024, 7, 1, 0, 0, 0))
        );

        let sunday = CronExpr::parse("0 12 * * 7").unwrap();
        // 2024-05-05 is a Sunday.
        assert_eq!(
            sunday.next_after(&utc(2024, 5, 1, 0, 0, 0)),
            Some(utc(2024, 5, 5, 12, 0, 0))
        );
    }

    #[test]
    fn test_dom_dow_or_rule() {
        // 13th of the month OR any Friday.
        let expr = CronExpr::parse("0 0 13 * 5").unwrap();
        // 2024-09-06 is a Friday, before the 13th.
        assert_eq!(
            expr.next_after(&utc(2024, 9, 1, 0, 0, 0)),
            Some(utc(2024, 9, 6, 0, 0, 0))
        );
        assert_eq!(
            expr.next_after(&utc(2024, 9, 6, 0, 0, 0)),
            Some(utc(2024, 9, 13, 0, 0, 0))
        );
    }

    #[test]
    fn test_starred_step_dom_is_and_rule() {
        // Odd days that are also Mondays.
        let expr = CronExpr::parse("0 0 */2 * 1").unwrap();
        let fire = expr.next_after(&utc(2024, 9, 1, 0, 0, 0)).unwrap();
        assert_eq!(fire.weekday().num_days_from_sunday(), 1);
        assert_eq!(fire.day() % 2, 1);
    }

    #[test]
    fn test_leap_day() {
        let expr = CronExpr::parse("0 0 29 2 *").unwrap();
        assert_eq!(
            expr.next_after(&utc(2025, 1, 1, 0, 0, 0)),
            Some(utc(2028, 2, 29, 0, 0, 0))
        );
    }

    #[test]
    fn test_macros() {
        let hourly = CronExpr::parse("@hourly").unwrap();
        assert_eq!(
            hourly.next_after(&utc(2024, 5, 1, 10, 30, 0)),
            Some(utc(2024, 5, 1, 11, 0, 0))
        );
        assert_eq!(
            CronExpr::parse("@reboot"),
            Err(CronParseError::UnknownMacro("@reboot".to_string()))
        );
    }

    #[test]
    fn test_fixed_offset_wall_clock() {
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let expr = CronExpr::parse("0 9 * * *").unwrap();
        let after = tz.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let next = expr.next_after(&after).unwrap();
        assert_eq!(next, tz.with_ymd_and_hms(2024, 5, 2, 9, 0, 0).unwrap());
        assert_eq!(next.with_timezone(&Utc), utc(2024, 5, 2, 7, 0, 0));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(CronExpr::parse("   "), Err(CronParseError::Empty));
        assert_eq!(CronExpr::parse("* * *"), Err(CronParseError::FieldCount(3)));
        assert!(matches!(
            CronExpr::parse("60 * * * *"),
            Err(CronParseError::OutOfRange { value: 60, .. })
        ));
        assert!(matches!(
            CronExpr::parse("*/0 * * * *"),
            Err(CronParseError::InvalidStep { .. })
        ));
        assert!(matches!(
            CronExpr::parse("10-5 * * * *"),
            Err(CronParseError::ReversedRange { start: 10, end: 5, .. })
        ));
        assert!(matches!(
            CronExpr::parse("x * * * *"),
            Err(CronParseError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_huge_step_does_not_overflow() {
        let expr = CronExpr::parse("59/4294967295 * * * *").unwrap();
        let after = utc(2024, 5, 1, 10, 0, 0);
        assert_eq!(expr.next_after(&after), Some(utc(2024, 5, 1, 10, 59, 0)));
        assert_eq!(
            expr.next_after(&utc(2024, 5, 1, 10, 59, 0)),
            Some(utc(2024, 5, 1, 11, 59, 0))
        );
    }

    /// US Eastern rules for 2024 only: EDT from 2024-03-10 07:00Z until
    /// 2024-11-03 06:00Z, EST otherwise.
    #[derive(Debug, Clone, Copy)]
    struct Eastern2024;

    impl Eastern2024 {
        fn est() -> FixedOffset {
            FixedOffset::west_opt(5 * 3600).unwrap()
        }

        fn edt() -> FixedOffset {
            FixedOffset::west_opt(4 * 3600).unwrap()
        }
    }

    impl TimeZone for Eastern2024 {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            Self
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            // Daylight offset first so candidates come out in instant order.
            let valid: Vec<FixedOffset> = [Self::edt(), Self::est()]
                .into_iter()
                .filter(|offset| {
                    let utc = *local - Duration::seconds(i64::from(offset.local_minus_utc()));
                    self.offset_from_utc_datetime(&utc) == *offset
                })
                .collect();
            match valid.as_slice() {
                [] => LocalResult::None,
                [only] => LocalResult::Single(*only),
                [early, late, ..] => LocalResult::Ambiguous(*early, *late),
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            let spring = NaiveDate::from_ymd_opt(2024, 3, 10)
                .unwrap()
                .and_hms_opt(7, 0, 0)
                .unwrap();
            let fall = NaiveDate::from_ymd_opt(2024, 11, 3)
                .unwrap()
                .and_hms_opt(6, 0, 0)
                .unwrap();
            if *utc >= spring && *utc < fall {
                Self::edt()
            } else {
                Self::est()
            }
        }
    }

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_time_in_spring_gap_is_skipped() {
        let expr = CronExpr::parse("30 2 * * *").unwrap();
        let after = Eastern2024.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();

        let next = expr.next_after(&after).unwrap();
        assert_eq!(next.naive_local(), naive(2024, 3, 11, 2, 30));
        assert_eq!(next.offset(), &Eastern2024::edt());
    }

    #[test]
    fn test_repeated_hour_fires_once_per_wall_time() {
        let expr = CronExpr::parse("*/30 * * * *").unwrap();
        let after = Eastern2024.with_ymd_and_hms(2024, 11, 3, 0, 40, 0).unwrap();

        let fires: Vec<_> = expr
            .upcoming(after)
            .take(4)
            .map(|dt| dt.naive_local())
            .collect();
        assert_eq!(
            fires,
            vec![
                naive(2024, 11, 3, 1, 0),
                naive(2024, 11, 3, 1, 30),
                naive(2024, 11, 3, 2, 0),
                naive(2024, 11, 3, 2, 30),
            ]
        );
    }

    #[test]
    fn test_reference_inside_repeated_hour_does_not_refire() {
        let expr = CronExpr::parse("*/30 * * * *").unwrap();
        // 01:10 EST, the second pass through the repeated hour.
        let after = Eastern2024.from_utc_datetime(&naive(2024, 11, 3, 6, 10));
        assert_eq!(after.naive_local(), naive(2024, 11, 3, 1, 10));

        let next = expr.next_after(&after).unwrap();
        assert_eq!(next.naive_local(), naive(2024, 11, 3, 2, 0));
        assert_eq!(next.offset(), &Eastern2024::est());
    }

    #[test]
    fn test_impossible_date_rejected() {
        assert_eq!(
            CronExpr::parse("0 0 30 2 *"),
            Err(CronParseError::NeverFires("0 0 30 2 *".to_string()))
        );
    }

    #[test]
    fn test_display_round_trips_source() {
        let expr: CronExpr = "*/2 * * * *".parse().unwrap();
        assert_eq!(expr.to_string(), "*/2 * * * *");
    }
}
