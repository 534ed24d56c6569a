//! Calendar helpers shared by the evaluator, the aggregator and the CLI.
//!
//! Dates are plain `NaiveDate`s in the user's local calendar, written as
//! `YYYY-MM-DD`. Weekdays use 0=Sunday..6=Saturday throughout.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, Days, Local, NaiveDate};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
        .with_context(|| format!("Invalid date '{}', expected YYYY-MM-DD", s))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse `YYYY-MM` into (year, month).
pub fn parse_month(s: &str) -> Result<(i32, u32)> {
    let first = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), DATE_FORMAT)
        .with_context(|| format!("Invalid month '{}', expected YYYY-MM", s))?;
    Ok((first.year(), first.month()))
}

pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

pub fn is_workday(date: NaiveDate) -> bool {
    (1..=5).contains(&weekday_index(date))
}

/// Sunday-to-Saturday week containing `date`, clamped at the calendar's ends.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = u64::from(weekday_index(date));
    let start = date.checked_sub_days(Days::new(offset)).unwrap_or(NaiveDate::MIN);
    let end = start.checked_add_days(Days::new(6)).unwrap_or(NaiveDate::MAX);
    (start, end)
}

pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

/// Every date from `start` to `end`, inclusive. Empty when `end < start`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |d| *d <= end)
}

pub fn weekday_name(index: u8) -> &'static str {
    match index {
        0 => "Sun",
        1 => "Mon",
        2 => "Tue",
        3 => "Wed",
        4 => "Thu",
        5 => "Fri",
        6 => "Sat",
        _ => "?",
    }
}

/// Parse a weekday list such as `mon,wed,5` into sorted indexes.
pub fn parse_weekdays(s: &str) -> Result<Vec<u8>> {
    let mut days = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let lower = part.to_ascii_lowercase();
        let day = match lower.as_str() {
            "sun" | "sunday" => 0,
            "mon" | "monday" => 1,
            "tue" | "tuesday" => 2,
            "wed" | "wednesday" => 3,
            "thu" | "thursday" => 4,
            "fri" | "friday" => 5,
            "sat" | "saturday" => 6,
            digits => match digits.parse::<u8>() {
                Ok(n) if n <= 6 => n,
                _ => bail!("Invalid weekday '{}'. Use sun..sat or 0..6", part),
            },
        };
        days.push(day);
    }
    days.sort_unstable();
    days.dedup();
    Ok(days)
}

pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
