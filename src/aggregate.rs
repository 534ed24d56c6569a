//! Completion ratios per day, week and month.
//!
//! Everything here is a pure function of the task list and the completion
//! records handed in. Missing data is treated as empty, so a caller holding
//! only part of a snapshot still gets a well-formed (if smaller) answer.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::dates::{days_between, format_date, month_bounds, week_bounds};
use crate::models::{DailyCompletion, Task, User};
use crate::recurrence::{recurs_between, DayFilter};

/// Where week and month rollups read "done" from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionSource {
    /// A task is done when a daily completion exists inside the period.
    #[default]
    DateKeyed,
    /// The task's own `completed` flag, regardless of date.
    TaskFlag,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Productivity {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

impl Productivity {
    pub fn new(completed: usize, total: usize) -> Self {
        let completed = completed.min(total);
        let percentage = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        Productivity {
            completed,
            total,
            percentage,
        }
    }

    pub fn empty() -> Self {
        Productivity::new(0, 0)
    }

    pub fn rounded(&self) -> u32 {
        self.percentage.round() as u32
    }
}

/// Completion records indexed by date for O(1) lookups.
#[derive(Debug, Clone, Default)]
pub struct CompletionLog {
    by_date: HashMap<NaiveDate, HashSet<i64>>,
}

impl CompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a DailyCompletion>) -> Self {
        let mut log = Self::new();
        for record in records {
            log.insert(record.task_id, record.completion_date);
        }
        log
    }

    pub fn insert(&mut self, task_id: i64, date: NaiveDate) -> bool {
        self.by_date.entry(date).or_default().insert(task_id)
    }

    pub fn remove(&mut self, task_id: i64, date: NaiveDate) -> bool {
        let Some(ids) = self.by_date.get_mut(&date) else {
            return false;
        };
        let removed = ids.remove(&task_id);
        if ids.is_empty() {
            self.by_date.remove(&date);
        }
        removed
    }

    pub fn contains(&self, task_id: i64, date: NaiveDate) -> bool {
        self.by_date
            .get(&date)
            .is_some_and(|ids| ids.contains(&task_id))
    }

    pub fn any_between(&self, task_id: i64, from: NaiveDate, to: NaiveDate) -> bool {
        days_between(from, to).any(|d| self.contains(task_id, d))
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

/// Tasks scheduled on one date, split into pending and completed.
#[derive(Debug, Clone, Default)]
pub struct DayTasks<'a> {
    pub pending: Vec<&'a Task>,
    pub completed: Vec<&'a Task>,
}

impl DayTasks<'_> {
    pub fn summary(&self) -> Productivity {
        Productivity::new(
            self.completed.len(),
            self.pending.len() + self.completed.len(),
        )
    }
}

/// Tasks listed on `date` under `filter`, split by the completion log.
pub fn split_day<'a>(
    tasks: &'a [Task],
    log: &CompletionLog,
    date: NaiveDate,
    filter: DayFilter,
) -> DayTasks<'a> {
    let mut out = DayTasks::default();
    for task in tasks.iter().filter(|t| filter.shows(t, date)) {
        if log.contains(task.id, date) {
            out.completed.push(task);
        } else {
            out.pending.push(task);
        }
    }
    out
}

pub fn day(tasks: &[Task], log: &CompletionLog, date: NaiveDate, filter: DayFilter) -> Productivity {
    split_day(tasks, log, date, filter).summary()
}

#[derive(Debug, Clone, Serialize)]
pub struct DayBucket {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub productivity: Productivity,
}

impl DayBucket {
    pub fn key(&self) -> String {
        format_date(self.date)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeekReport {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub summary: Productivity,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthReport {
    pub year: i32,
    pub month: u32,
    pub summary: Productivity,
    /// One bucket per day, ascending by date.
    pub days: Vec<DayBucket>,
}

fn created_between(task: &Task, from: NaiveDate, to: NaiveDate) -> bool {
    task.start_date().is_some_and(|d| from <= d && d <= to)
}

fn rollup<'a>(
    members: impl Iterator<Item = &'a Task>,
    log: &CompletionLog,
    source: CompletionSource,
    from: NaiveDate,
    to: NaiveDate,
) -> Productivity {
    let mut total = 0;
    let mut completed = 0;
    for task in members {
        total += 1;
        let done = match source {
            CompletionSource::DateKeyed => log.any_between(task.id, from, to),
            CompletionSource::TaskFlag => task.completed,
        };
        if done {
            completed += 1;
        }
    }
    Productivity::new(completed, total)
}

/// Tasks created during the Sunday-start week of `date`, or recurring on
/// any of its days.
pub fn week(
    tasks: &[Task],
    log: &CompletionLog,
    date: NaiveDate,
    source: CompletionSource,
) -> WeekReport {
    let (start, end) = week_bounds(date);
    let members = tasks.iter().filter(|t| {
        created_between(t, start, end) || (!t.is_daily && recurs_between(t, start, end))
    });
    WeekReport {
        start,
        end,
        summary: rollup(members, log, source, start, end),
    }
}

/// Month summary over tasks created in the month, plus a per-day breakdown.
///
/// The breakdown starts at `not_before` when that date falls inside the
/// month (typically the viewed user's registration date). An invalid
/// month yields an empty report.
pub fn month(
    tasks: &[Task],
    log: &CompletionLog,
    year: i32,
    month: u32,
    source: CompletionSource,
    filter: DayFilter,
    not_before: Option<NaiveDate>,
) -> MonthReport {
    let Some((first, last)) = month_bounds(year, month) else {
        return MonthReport {
            year,
            month,
            summary: Productivity::empty(),
            days: Vec::new(),
        };
    };
    let members = tasks.iter().filter(|t| created_between(t, first, last));
    let summary = rollup(members, log, source, first, last);

    let breakdown_start = match not_before {
        Some(d) if d > first => d,
        _ => first,
    };
    let days = days_between(breakdown_start, last)
        .map(|date| DayBucket {
            date,
            productivity: day(tasks, log, date, filter),
        })
        .collect();

    MonthReport {
        year,
        month,
        summary,
        days,
    }
}

/// Tasks listed on one day grouped by category name.
pub fn by_category<'a>(
    tasks: &'a [Task],
    log: &CompletionLog,
    date: NaiveDate,
    filter: DayFilter,
) -> BTreeMap<String, Vec<(&'a Task, bool)>> {
    let mut groups: BTreeMap<String, Vec<(&Task, bool)>> = BTreeMap::new();
    for task in tasks.iter().filter(|t| filter.shows(t, date)) {
        let name = if task.category.trim().is_empty() {
            "Uncategorized".to_string()
        } else {
            task.category.clone()
        };
        groups
            .entry(name)
            .or_default()
            .push((task, log.contains(task.id, date)));
    }
    groups
}

#[derive(Debug, Clone, Serialize)]
pub struct UserOverview {
    pub user_id: i64,
    pub name: String,
    pub daily: Productivity,
    pub weekly: Productivity,
    pub monthly: Productivity,
}

/// Day, week and month summaries for each user, in the order given.
///
/// `tasks` and `completions` hold every user's records; each user only sees
/// their own.
pub fn team_overview(
    users: &[User],
    tasks: &[Task],
    completions: &[DailyCompletion],
    date: NaiveDate,
    source: CompletionSource,
    filter: DayFilter,
) -> Vec<UserOverview> {
    users
        .iter()
        .map(|user| {
            let own: Vec<Task> = tasks
                .iter()
                .filter(|t| t.user_id == user.id)
                .cloned()
                .collect();
            let log =
                CompletionLog::from_records(completions.iter().filter(|c| c.user_id == user.id));
            UserOverview {
                user_id: user.id,
                name: user.name.clone(),
                daily: day(&own, &log, date, filter),
                weekly: week(&own, &log, date, source).summary,
                monthly: month(&own, &log, date.year(), date.month(), source, filter, None)
                    .summary,
            }
        })
        .collect()
}
