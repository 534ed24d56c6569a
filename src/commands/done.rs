use anyhow::{bail, Result};
use chrono::{DateTime, Local, NaiveDate, Timelike};
use tracing::info;

use crate::commands::require_task;
use crate::config::Config;
use crate::context::ViewContext;
use crate::dates::format_date;
use crate::db::Database;
use crate::live::DayBoard;
use crate::models::{Shift, Task};

/// Tasks may only be marked today, and only inside their shift.
pub fn check_shift(task: &Task, date: NaiveDate, now: DateTime<Local>) -> Result<()> {
    if date != now.date_naive() {
        bail!(
            "Tasks can only be marked on the current day (asked for {})",
            format_date(date)
        );
    }
    let current = Shift::at_hour(now.hour());
    if !task.shift.allows(current) {
        bail!(
            "Task #{} belongs to the {} shift; it is now {}. Use --any-time to override",
            task.id,
            task.shift.as_str(),
            current.as_str()
        );
    }
    Ok(())
}

/// Toggle a task's completion for `date`. Returns the new state.
pub fn run(
    db: &Database,
    ctx: &ViewContext,
    config: &Config,
    id: i64,
    date: NaiveDate,
    any_time: bool,
    now: DateTime<Local>,
) -> Result<bool> {
    let task = require_task(db, ctx, id)?;
    if task.is_archived {
        bail!("Task #{} is archived", id);
    }
    let board = DayBoard::open(db, ctx, date, config.day_filter())?;
    if !board.lists(id) {
        bail!("Task #{} is not scheduled on {}", id, format_date(date));
    }
    if config.enforce_shift && !any_time {
        check_shift(&task, date, now)?;
    }

    let done = db.toggle_completion(ctx, id, date)?;
    info!(task = id, date = %format_date(date), done, "completion toggled");

    if done {
        println!("Marked #{} done for {}: {}", id, format_date(date), task.name);
    } else {
        println!("Marked #{} pending for {}: {}", id, format_date(date), task.name);
    }
    let summary = board.summary();
    println!(
        "Day progress: {}/{} ({}%)",
        summary.completed,
        summary.total,
        summary.rounded()
    );

    Ok(done)
}
