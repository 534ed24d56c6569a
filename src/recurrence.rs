//! Decides which calendar days a task is active on.

use chrono::{Days, NaiveDate};

use crate::dates::{days_between, weekday_index};
use crate::models::{Repetition, Task};

/// Last day of a week-limited task's repetition window.
///
/// `None` when the task repeats forever, or when it has no creation date to
/// count from (such a task is treated as unrestricted).
pub fn period_end(task: &Task) -> Option<NaiveDate> {
    let Repetition::ByWeeks(weeks) = task.repetition else {
        return None;
    };
    let start = task.start_date()?;
    let span = u64::from(weeks).saturating_mul(7).saturating_sub(1);
    start.checked_add_days(Days::new(span))
}

fn scheduled_weekday(task: &Task, weekday: u8) -> bool {
    if task.is_daily {
        (1..=5).contains(&weekday)
    } else {
        task.selected_days.contains(&weekday)
    }
}

fn within_period(task: &Task, date: NaiveDate) -> bool {
    let Repetition::ByWeeks(weeks) = task.repetition else {
        return true;
    };
    let Some(start) = task.start_date() else {
        return true;
    };
    match period_end(task) {
        Some(end) => start <= date && date <= end,
        // Window end overflowed the calendar, so only the lower bound matters.
        None => weeks > 0 && start <= date,
    }
}

/// True when the task falls on `date` under its recurrence policy.
pub fn is_scheduled(task: &Task, date: NaiveDate) -> bool {
    scheduled_weekday(task, weekday_index(date)) && within_period(task, date)
}

/// Like [`is_scheduled`], but also false before the task was created.
/// A task without a creation date is never applicable.
pub fn is_applicable(task: &Task, date: NaiveDate) -> bool {
    match task.start_date() {
        Some(start) => date >= start && is_scheduled(task, date),
        None => false,
    }
}

/// Which of a day's scheduled tasks are listed for that day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DayFilter {
    /// Every task scheduled on the date.
    #[default]
    Scheduled,
    /// Scheduled tasks that already existed on the date.
    Applicable,
}

impl DayFilter {
    pub fn hiding_before_creation(hide: bool) -> Self {
        if hide {
            DayFilter::Applicable
        } else {
            DayFilter::Scheduled
        }
    }

    pub fn shows(&self, task: &Task, date: NaiveDate) -> bool {
        match self {
            DayFilter::Scheduled => is_scheduled(task, date),
            DayFilter::Applicable => is_applicable(task, date),
        }
    }
}

/// Scheduled dates of `task` between `from` and `to`, inclusive.
pub fn occurrences(task: &Task, from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    days_between(from, to)
        .filter(|d| is_scheduled(task, *d))
        .collect()
}

/// True when the task recurs on at least one day of `[from, to]`.
pub fn recurs_between(task: &Task, from: NaiveDate, to: NaiveDate) -> bool {
    days_between(from, to).any(|d| is_scheduled(task, d))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dates::parse_date;
    use crate::models::{Priority, Shift};
    use arbitrary::{Arbitrary, Unstructured};
    use chrono::{Local, TimeZone};
    use proptest::prelude::*;

    pub(crate) fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    pub(crate) fn task_created(id: i64, created: Option<&str>) -> Task {
        let created_at = created.map(|s| {
            let date = d(s);
            Local
                .from_local_datetime(&date.and_hms_opt(9, 0, 0).unwrap())
                .earliest()
                .unwrap()
        });
        Task {
            id,
            user_id: 1,
            name: format!("Task {}", id),
            category: "General".to_string(),
            is_daily: true,
            selected_days: vec![],
            repetition: Repetition::Continuous,
            shift: Shift::Any,
            priority: Priority::ImportantUrgent,
            completed: false,
            created_at,
            order_index: id,
            is_archived: false,
        }
    }

    pub(crate) fn weekly_task(id: i64, created: Option<&str>, days: &[u8]) -> Task {
        let mut task = task_created(id, created);
        task.is_daily = false;
        task.selected_days = days.to_vec();
        task
    }

    #[test]
    fn test_daily_task_weekdays_only() {
        let task = task_created(1, Some("2024-01-01"));
        assert!(!is_scheduled(&task, d("2024-03-03"))); // Sunday
        assert!(is_scheduled(&task, d("2024-03-04"))); // Monday
        assert!(is_scheduled(&task, d("2024-03-08"))); // Friday
        assert!(!is_scheduled(&task, d("2024-03-09"))); // Saturday
    }

    #[test]
    fn test_selected_days() {
        let task = weekly_task(1, Some("2024-01-01"), &[0, 3]);
        assert!(is_scheduled(&task, d("2024-03-03")));
        assert!(is_scheduled(&task, d("2024-03-06")));
        assert!(!is_scheduled(&task, d("2024-03-04")));
    }

    #[test]
    fn test_empty_selected_days_never_scheduled() {
        let task = weekly_task(1, Some("2024-01-01"), &[]);
        assert!(occurrences(&task, d("2024-01-01"), d("2024-12-31")).is_empty());
    }

    #[test]
    fn test_limited_weeks_window() {
        let mut task = weekly_task(1, Some("2024-01-01"), &[0, 1, 2, 3, 4, 5, 6]);
        task.repetition = Repetition::ByWeeks(2);

        assert_eq!(period_end(&task), Some(d("2024-01-14")));
        assert!(is_scheduled(&task, d("2024-01-01")));
        assert!(is_scheduled(&task, d("2024-01-14")));
        assert!(!is_scheduled(&task, d("2024-01-15")));
        assert!(!is_scheduled(&task, d("2023-12-31")));
    }

    #[test]
    fn test_limited_weeks_daily_respects_weekdays() {
        let mut task = task_created(1, Some("2024-01-01"));
        task.repetition = Repetition::ByWeeks(2);
        // 2024-01-13 is a Saturday inside the window.
        assert!(!is_scheduled(&task, d("2024-01-13")));
        assert!(is_scheduled(&task, d("2024-01-12")));
        assert!(!is_scheduled(&task, d("2024-01-15")));
    }

    #[test]
    fn test_limited_weeks_without_creation_date_is_unrestricted() {
        let mut task = task_created(1, None);
        task.repetition = Repetition::ByWeeks(1);
        assert_eq!(period_end(&task), None);
        assert!(is_scheduled(&task, d("2030-06-03")));
    }

    #[test]
    fn test_applicable_excludes_days_before_creation() {
        let task = task_created(1, Some("2024-03-06"));
        assert!(is_scheduled(&task, d("2024-03-04")));
        assert!(!is_applicable(&task, d("2024-03-04")));
        assert!(is_applicable(&task, d("2024-03-06")));
        assert!(!is_applicable(&task_created(2, None), d("2024-03-06")));
    }

    #[test]
    fn test_day_filter() {
        let task = task_created(1, Some("2024-03-06"));
        let monday = d("2024-03-04");
        assert!(DayFilter::Scheduled.shows(&task, monday));
        assert!(!DayFilter::Applicable.shows(&task, monday));
        assert!(DayFilter::Applicable.shows(&task, d("2024-03-07")));
        assert_eq!(DayFilter::hiding_before_creation(true), DayFilter::Applicable);
        assert_eq!(DayFilter::hiding_before_creation(false), DayFilter::default());
    }

    #[test]
    fn test_recurs_between() {
        let task = weekly_task(1, Some("2024-01-01"), &[6]);
        assert!(recurs_between(&task, d("2024-03-03"), d("2024-03-09")));
        assert!(!recurs_between(&task, d("2024-03-03"), d("2024-03-08")));
    }

    #[test]
    fn test_arbitrary_tasks_never_panic() {
        let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let mut u = Unstructured::new(&bytes);
        for _ in 0..64 {
            let Ok(days) = Vec::<u8>::arbitrary(&mut u) else { break };
            let Ok(weeks) = u32::arbitrary(&mut u) else { break };
            let Ok(daily) = bool::arbitrary(&mut u) else { break };
            let mut task = weekly_task(1, Some("2024-01-01"), &days);
            task.is_daily = daily;
            task.repetition = Repetition::ByWeeks(weeks);
            let _ = is_scheduled(&task, d("2024-02-29"));
            let _ = period_end(&task);
        }
    }

    proptest! {
        #[test]
        fn prop_daily_iff_workday(offset in 0i64..10_000) {
            let date = d("2000-01-01") + chrono::Duration::days(offset);
            let task = task_created(1, Some("1999-01-01"));
            let weekday = weekday_index(date);
            prop_assert_eq!(is_scheduled(&task, date), (1..=5).contains(&weekday));
        }

        #[test]
        fn prop_selected_iff_member(
            offset in 0i64..10_000,
            days in proptest::collection::vec(0u8..7, 0..7),
        ) {
            let date = d("2000-01-01") + chrono::Duration::days(offset);
            let task = weekly_task(1, Some("1999-01-01"), &days);
            prop_assert_eq!(is_scheduled(&task, date), days.contains(&weekday_index(date)));
        }

        #[test]
        fn prop_limited_window_length(weeks in 1u32..20) {
            let mut task = weekly_task(1, Some("2024-01-01"), &[0, 1, 2, 3, 4, 5, 6]);
            task.repetition = Repetition::ByWeeks(weeks);
            let hits = occurrences(&task, d("2023-12-01"), d("2025-12-31")).len();
            prop_assert_eq!(hits as u32, weeks * 7);
        }
    }
}
