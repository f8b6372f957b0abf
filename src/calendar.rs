//! UTC calendar-month arithmetic used by stats and dashboard queries.

use time::{Date, Duration, OffsetDateTime};

/// First day of the month containing `date`.
pub fn month_start(date: Date) -> Date {
    date - Duration::days(i64::from(date.day()) - 1)
}

/// First day of the month before the one containing `date`.
pub fn previous_month(date: Date) -> Date {
    month_start(month_start(date) - Duration::days(1))
}

/// First day of the month after the one containing `date`.
pub fn next_month(date: Date) -> Date {
    month_start(month_start(date) + Duration::days(31))
}

pub fn at_midnight_utc(date: Date) -> OffsetDateTime {
    date.midnight().assume_utc()
}

/// The `n` month starts ending with the month of `current`, oldest first.
pub fn trailing_months(current: Date, n: usize) -> Vec<Date> {
    let mut months = Vec::with_capacity(n);
    let mut month = month_start(current);
    for _ in 0..n {
        months.push(month);
        month = previous_month(month);
    }
    months.reverse();
    months
}

/// `YYYY-MM`.
pub fn month_label(month: Date) -> String {
    format!("{:04}-{:02}", month.year(), u8::from(month.month()))
}
