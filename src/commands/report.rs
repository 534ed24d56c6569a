use anyhow::{bail, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;

use crate::aggregate::{self, CompletionLog, Productivity};
use crate::config::Config;
use crate::context::ViewContext;
use crate::dates::{format_date, format_duration, month_bounds, parse_month, today, week_bounds};
use crate::db::Database;
use crate::models::{Task, DEFAULT_CATEGORY_COLOR};

fn summary_line(label: &str, p: &Productivity) -> String {
    format!(
        "{}: {}/{} completed ({}%)",
        label,
        p.completed,
        p.total,
        p.rounded()
    )
}

fn day_inputs(
    db: &Database,
    ctx: &ViewContext,
    date: NaiveDate,
) -> Result<(Vec<Task>, CompletionLog)> {
    let tasks = db.list_tasks(ctx, false)?;
    let log = CompletionLog::from_records(&db.list_completions(ctx, date, date)?);
    Ok((tasks, log))
}

/// Completion of the tasks listed on `date`.
pub fn day_summary(
    db: &Database,
    ctx: &ViewContext,
    config: &Config,
    date: NaiveDate,
) -> Result<Productivity> {
    let (tasks, log) = day_inputs(db, ctx, date)?;
    Ok(aggregate::day(&tasks, &log, date, config.day_filter()))
}

/// Daily detail: the day's tasks grouped by category.
pub fn day(db: &Database, ctx: &ViewContext, config: &Config, date: NaiveDate) -> Result<()> {
    let filter = config.day_filter();
    let (tasks, log) = day_inputs(db, ctx, date)?;
    let colors: BTreeMap<String, String> = db
        .list_categories(ctx)?
        .into_iter()
        .map(|c| (c.name, c.color))
        .collect();

    println!("{}", ctx.banner());
    println!(
        "{}\n",
        summary_line(&format_date(date), &aggregate::day(&tasks, &log, date, filter))
    );

    let groups = aggregate::by_category(&tasks, &log, date, filter);
    if groups.is_empty() {
        println!("Nothing scheduled.");
        return Ok(());
    }
    for (category, entries) in groups {
        let color = colors
            .get(&category)
            .map(String::as_str)
            .unwrap_or(DEFAULT_CATEGORY_COLOR);
        println!("{} ({})", category, color);
        for (task, done) in entries {
            let mark = if done { "[x]" } else { "[ ]" };
            println!("  {} #{:<4} {}", mark, task.id, task.name);
        }
    }

    Ok(())
}

pub fn week(db: &Database, ctx: &ViewContext, config: &Config, date: NaiveDate) -> Result<()> {
    let (start, end) = week_bounds(date);
    let tasks = db.list_tasks(ctx, false)?;
    let log = CompletionLog::from_records(&db.list_completions(ctx, start, end)?);
    let report = aggregate::week(&tasks, &log, date, config.completion_source);

    println!("{}", ctx.banner());
    println!(
        "{}",
        summary_line(
            &format!("Week {} to {}", format_date(report.start), format_date(report.end)),
            &report.summary
        )
    );
    Ok(())
}

pub fn month(
    db: &Database,
    ctx: &ViewContext,
    config: &Config,
    month: Option<&str>,
) -> Result<()> {
    let (year, month) = match month {
        Some(s) => parse_month(s)?,
        None => {
            let now = today();
            (now.year(), now.month())
        }
    };
    let Some((first, last)) = month_bounds(year, month) else {
        bail!("Invalid month {}-{:02}", year, month);
    };

    let tasks = db.list_tasks(ctx, false)?;
    let log = CompletionLog::from_records(&db.list_completions(ctx, first, last)?);
    let registered = ctx.subject().created_at.map(|dt| dt.date_naive());
    let report = aggregate::month(
        &tasks,
        &log,
        year,
        month,
        config.completion_source,
        config.day_filter(),
        registered,
    );

    println!("{}", ctx.banner());
    println!(
        "{}\n",
        summary_line(&format!("{}-{:02}", year, month), &report.summary)
    );
    for bucket in &report.days {
        if bucket.productivity.total == 0 {
            continue;
        }
        println!("  {}", summary_line(&bucket.key(), &bucket.productivity));
    }
    Ok(())
}

/// Seconds spent per task name, plus off-task time, between two dates.
#[derive(Debug, Default, PartialEq)]
pub struct TimeTotals {
    pub by_task: BTreeMap<String, i64>,
    pub off_task: i64,
}

impl TimeTotals {
    pub fn total(&self) -> i64 {
        self.by_task.values().sum::<i64>() + self.off_task
    }
}

pub fn time_totals(
    db: &Database,
    ctx: &ViewContext,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<TimeTotals> {
    if to < from {
        bail!("--to {} is before --from {}", format_date(to), format_date(from));
    }
    let mut totals = TimeTotals::default();
    for session in db.list_task_sessions(ctx, from, to)? {
        *totals.by_task.entry(session.task_name).or_default() += session.duration;
    }
    totals.off_task = db
        .list_off_task_sessions(ctx, from, to)?
        .iter()
        .map(|s| s.duration)
        .sum();
    Ok(totals)
}

pub fn time(db: &Database, ctx: &ViewContext, from: NaiveDate, to: NaiveDate) -> Result<()> {
    let totals = time_totals(db, ctx, from, to)?;

    println!("{}", ctx.banner());
    println!("Time from {} to {}\n", format_date(from), format_date(to));
    if totals.total() == 0 {
        println!("No time recorded.");
        return Ok(());
    }
    for (name, seconds) in &totals.by_task {
        println!("  {:<40} {}", name, format_duration(*seconds));
    }
    if totals.off_task > 0 {
        println!("  {:<40} {}", "(off task)", format_duration(totals.off_task));
    }
    println!("\n  {:<40} {}", "Total", format_duration(totals.total()));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{add_user, daily_task, setup_test_db};
    use crate::dates::parse_date;
    use crate::live::DayBoard;
    use crate::models::Role;
    use crate::timer::{FinishedSession, TimerTarget};
    use chrono::{Duration, Local};

    fn session(target: TimerTarget, seconds: i64, date: NaiveDate) -> FinishedSession {
        let now = Local::now();
        FinishedSession {
            target,
            duration: seconds,
            start_time: now,
            end_time: now + Duration::seconds(seconds),
            date,
        }
    }

    #[test]
    fn test_time_totals() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let monday = parse_date("2024-03-04").unwrap();
        let tuesday = parse_date("2024-03-05").unwrap();
        let deep = TimerTarget::Task {
            id: 1,
            name: "Deep work".to_string(),
        };
        db.record_session(&ctx, &session(deep.clone(), 600, monday)).unwrap();
        db.record_session(&ctx, &session(deep, 300, tuesday)).unwrap();
        db.record_session(&ctx, &session(TimerTarget::OffTask, 120, monday)).unwrap();

        let totals = time_totals(&db, &ctx, monday, monday).unwrap();
        assert_eq!(totals.by_task.get("Deep work"), Some(&600));
        assert_eq!(totals.off_task, 120);
        assert_eq!(totals.total(), 720);

        let both = time_totals(&db, &ctx, monday, tuesday).unwrap();
        assert_eq!(both.by_task.get("Deep work"), Some(&900));
    }

    #[test]
    fn test_time_totals_rejects_reversed_range() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let monday = parse_date("2024-03-04").unwrap();
        let sunday = parse_date("2024-03-03").unwrap();
        assert!(time_totals(&db, &ctx, monday, sunday).is_err());
    }

    #[test]
    fn test_day_summary_matches_board() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        db.create_task(&ctx, &daily_task("Standup")).unwrap();
        let monday = parse_date("2024-03-04").unwrap();

        for hide in [false, true] {
            let config = Config {
                hide_before_creation: hide,
                ..Config::default()
            };
            let board = DayBoard::open(&db, &ctx, monday, config.day_filter()).unwrap();
            let summary = day_summary(&db, &ctx, &config, monday).unwrap();
            assert_eq!(summary, board.summary());
            assert_eq!(summary.total, usize::from(!hide));
        }
    }

    #[test]
    fn test_reports_run() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        db.create_category(&ctx, "General", "#FF0000").unwrap();
        let id = db.create_task(&ctx, &daily_task("Standup")).unwrap();
        let date = today();
        db.toggle_completion(&ctx, id, date).unwrap();

        assert!(day(&db, &ctx, &Config::default(), date).is_ok());
        assert!(week(&db, &ctx, &Config::default(), date).is_ok());
        assert!(month(&db, &ctx, &Config::default(), None).is_ok());
        assert!(month(&db, &ctx, &Config::default(), Some("2024-02")).is_ok());
        assert!(month(&db, &ctx, &Config::default(), Some("2024-13")).is_err());
        assert!(time(&db, &ctx, date, date).is_ok());
    }
}
