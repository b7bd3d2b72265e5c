//! Recurrence calculator — pure calendar arithmetic, no I/O.
//!
//! All arithmetic operates in UTC; no timezone conversion happens
//! anywhere in this subsystem.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use tasknest_core::{NestError, Recurrence, Result};

/// Compute the next occurrence after `current` for a recurrence pattern.
///
/// The anchor is the parent task's original due date; its day-of-month
/// keeps monthly recurrences stable across short months (a task anchored
/// on the 31st lands on the 28th/29th/30th of shorter months and returns
/// to the 31st when the month allows it). Weekly recurrence preserves
/// day-of-week by construction (+7 days). Time-of-day is carried over
/// from `current`.
pub fn next_occurrence(
    current: DateTime<Utc>,
    anchor: DateTime<Utc>,
    pattern: Recurrence,
) -> Result<DateTime<Utc>> {
    match pattern {
        Recurrence::None => Err(NestError::InvalidRecurrence("none".into())),
        Recurrence::Daily => Ok(current + Duration::days(1)),
        Recurrence::Weekly => Ok(current + Duration::days(7)),
        Recurrence::Monthly => next_month(current, anchor),
    }
}

fn next_month(current: DateTime<Utc>, anchor: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let (year, month) = if current.month() == 12 {
        (current.year() + 1, 1)
    } else {
        (current.year(), current.month() + 1)
    };
    let day = anchor.day().min(days_in_month(year, month));
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => Ok(date.and_time(current.time()).and_utc()),
        None => Err(NestError::Validation(format!(
            "date out of range: {year}-{month:02}-{day:02}"
        ))),
    }
}

/// Number of days in a calendar month, leap years included.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
    }
}
