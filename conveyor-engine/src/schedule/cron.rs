//! Five-field cron expression parsing and evaluation.
//!
//! Supports the classic `minute hour day-of-month month day-of-week` form with
//! `*`, lists, ranges, and step values. Day-of-month and day-of-week follow
//! standard cron semantics: when both are restricted, a time matches if either
//! field matches.

use chrono::{DateTime, Datelike, Duration, DurationRound, Timelike, Utc};

use crate::error::{EngineError, EngineResult, ErrorKind};

/// A parsed cron schedule with minute precision.
#[derive(Debug, Clone, PartialEq)]
pub struct CronSchedule {
    minutes: Vec<u32>,
    hours: Vec<u32>,
    days_of_month: Vec<u32>,
    months: Vec<u32>,
    days_of_week: Vec<u32>,
    day_of_month_restricted: bool,
    day_of_week_restricted: bool,
}

impl CronSchedule {
    /// Parses a five-field cron expression.
    pub fn parse(expression: &str) -> EngineResult<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(invalid(
                expression,
                format!("expected 5 fields, got {}", fields.len()),
            ));
        }

        let minutes = parse_field(expression, fields[0], 0, 59)?;
        let hours = parse_field(expression, fields[1], 0, 23)?;
        let days_of_month = parse_field(expression, fields[2], 1, 31)?;
        let months = parse_field(expression, fields[3], 1, 12)?;
        // 7 is accepted as an alias for Sunday and normalized to 0.
        let mut days_of_week = parse_field(expression, fields[4], 0, 7)?;
        for day in &mut days_of_week {
            if *day == 7 {
                *day = 0;
            }
        }
        days_of_week.sort_unstable();
        days_of_week.dedup();

        Ok(Self {
            minutes,
            hours,
            days_of_month,
            months,
            days_of_week,
            day_of_month_restricted: fields[2] != "*",
            day_of_week_restricted: fields[4] != "*",
        })
    }

    /// Returns `true` when the schedule fires at the given minute.
    pub fn matches(&self, at: DateTime<Utc>) -> bool {
        if !self.minutes.contains(&at.minute()) || !self.hours.contains(&at.hour()) {
            return false;
        }
        if !self.months.contains(&at.month()) {
            return false;
        }

        let dom_match = self.days_of_month.contains(&at.day());
        let dow_match = self
            .days_of_week
            .contains(&at.weekday().num_days_from_sunday());

        match (self.day_of_month_restricted, self.day_of_week_restricted) {
            // Standard cron: either restricted field matching is enough.
            (true, true) => dom_match || dow_match,
            (true, false) => dom_match,
            (false, true) => dow_match,
            (false, false) => true,
        }
    }

    /// Returns `true` when the schedule fires at any minute boundary in the
    /// half-open window `(after, until]`.
    pub fn fires_between(&self, after: DateTime<Utc>, until: DateTime<Utc>) -> bool {
        if until <= after {
            return false;
        }

        // First minute boundary strictly after `after`.
        let Ok(floor) = after.duration_trunc(Duration::minutes(1)) else {
            return false;
        };
        let mut candidate = floor + Duration::minutes(1);

        while candidate <= until {
            if self.matches(candidate) {
                return true;
            }
            candidate += Duration::minutes(1);
        }

        false
    }
}

fn invalid(expression: &str, reason: String) -> EngineError {
    engine_error!(
        ErrorKind::InvalidCronExpression,
        "invalid cron expression",
        format!("`{expression}`: {reason}")
    )
}

/// Parses one cron field into a sorted, deduplicated list of values.
fn parse_field(expression: &str, field: &str, min: u32, max: u32) -> EngineResult<Vec<u32>> {
    let mut values = Vec::new();

    for part in field.split(',') {
        let (range_part, step) = match part.split_once('/') {
            Some((range_part, step_str)) => {
                let step: u32 = step_str
                    .parse()
                    .map_err(|_| invalid(expression, format!("invalid step `{step_str}`")))?;
                if step == 0 {
                    return Err(invalid(expression, "step must be greater than zero".into()));
                }
                (range_part, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range_part == "*" {
            (min, max)
        } else if let Some((start_str, end_str)) = range_part.split_once('-') {
            let start = parse_value(expression, start_str, min, max)?;
            let end = parse_value(expression, end_str, min, max)?;
            if start > end {
                return Err(invalid(
                    expression,
                    format!("range `{range_part}` is inverted"),
                ));
            }
            (start, end)
        } else {
            let value = parse_value(expression, range_part, min, max)?;
            // A bare value with a step (`5/15`) extends to the field maximum,
            // matching Vixie cron.
            if step > 1 { (value, max) } else { (value, value) }
        };

        let mut value = start;
        while value <= end {
            values.push(value);
            value += step;
        }
    }

    if values.is_empty() {
        return Err(invalid(expression, format!("field `{field}` is empty")));
    }

    values.sort_unstable();
    values.dedup();
    Ok(values)
}

fn parse_value(expression: &str, value: &str, min: u32, max: u32) -> EngineResult<u32> {
    let parsed: u32 = value
        .parse()
        .map_err(|_| invalid(expression, format!("`{value}` is not a number")))?;
    if parsed < min || parsed > max {
        return Err(invalid(
            expression,
            format!("`{parsed}` is outside the range {min}-{max}"),
        ));
    }
    Ok(parsed)
}
