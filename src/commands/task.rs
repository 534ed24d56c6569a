use anyhow::{bail, Result};
use tracing::info;

use crate::aggregate::{split_day, CompletionLog};
use crate::commands::require_task;
use crate::context::ViewContext;
use crate::dates::{format_date, parse_weekdays, weekday_name};
use crate::db::Database;
use crate::models::{NewTask, Priority, Repetition, Task};
use crate::recurrence::{period_end, DayFilter};
use chrono::NaiveDate;

/// Assemble a task from command-line arguments. Giving weekdays makes the
/// task weekly on those days; otherwise it runs every workday.
pub fn build(
    name: &str,
    category: Option<&str>,
    days: Option<&str>,
    weeks: Option<u32>,
    shift: &str,
    priority: &str,
) -> Result<NewTask> {
    let selected_days = match days {
        Some(d) => parse_weekdays(d)?,
        None => Vec::new(),
    };
    let repetition = match weeks {
        Some(n) => Repetition::ByWeeks(n),
        None => Repetition::Continuous,
    };
    NewTask {
        name: name.to_string(),
        category: category.unwrap_or_default().to_string(),
        is_daily: days.is_none(),
        selected_days,
        repetition,
        shift: shift.parse()?,
        priority: priority.parse()?,
    }
    .validated()
}

/// Once the user has categories, a task's category must be one of them.
fn check_category(db: &Database, ctx: &ViewContext, category: &str) -> Result<()> {
    if category.is_empty() {
        return Ok(());
    }
    let categories = db.list_categories(ctx)?;
    if !categories.is_empty() && !categories.iter().any(|c| c.name == category) {
        bail!(
            "Unknown category '{}'. Create it with 'taskmap category add'",
            category
        );
    }
    Ok(())
}

pub fn add(db: &Database, ctx: &ViewContext, task: NewTask) -> Result<i64> {
    check_category(db, ctx, &task.category)?;

    let id = db.create_task(ctx, &task)?;
    info!(id, user = %ctx.subject().email, "task created");
    println!("Created task #{}: {}", id, task.name);
    Ok(id)
}

/// Active tasks in list order, optionally narrowed to one priority.
pub fn list(db: &Database, ctx: &ViewContext, priority: Option<&str>) -> Result<()> {
    let priority: Option<Priority> = priority.map(str::parse).transpose()?;
    let tasks: Vec<Task> = db
        .list_tasks(ctx, false)?
        .into_iter()
        .filter(|t| priority.map_or(true, |p| t.priority == p))
        .collect();

    if ctx.is_supervising() {
        println!("{}\n", ctx.banner());
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    for task in tasks {
        println!(
            "#{:<4} {:<40} {:<14} {:<9} {}",
            task.id,
            truncate(&task.name, 40),
            truncate(&task.category, 14),
            task.shift.as_str(),
            schedule_label(&task)
        );
    }

    Ok(())
}

pub fn show(db: &Database, ctx: &ViewContext, id: i64) -> Result<()> {
    let task = require_task(db, ctx, id)?;

    println!("Task #{}: {}", task.id, task.name);
    if !task.category.is_empty() {
        println!("Category: {}", task.category);
    }
    println!("Schedule: {}", schedule_label(&task));
    if let Some(end) = period_end(&task) {
        println!("Repeats until: {}", format_date(end));
    }
    println!("Shift: {}", task.shift.as_str());
    println!("Priority: {}", task.priority.label());
    if let Some(created) = task.created_at {
        println!("Created: {}", created.format("%Y-%m-%d %H:%M:%S"));
    }
    if task.is_archived {
        println!("Archived: yes");
    }

    Ok(())
}

pub fn update(
    db: &Database,
    ctx: &ViewContext,
    id: i64,
    name: Option<&str>,
    category: Option<&str>,
    completed: Option<bool>,
) -> Result<()> {
    if name.is_none() && category.is_none() && completed.is_none() {
        bail!("Nothing to update. Use --name, --category or --completed");
    }
    let name = name.map(str::trim);
    if name.is_some_and(str::is_empty) {
        bail!("Task name cannot be empty");
    }
    if let Some(category) = category {
        check_category(db, ctx, category)?;
    }

    if db.update_task(ctx, id, name, category, completed)? {
        println!("Updated task #{}", id);
    } else {
        bail!("Task #{} not found", id);
    }

    Ok(())
}

pub fn set_priority(db: &Database, ctx: &ViewContext, id: i64, priority: &str) -> Result<()> {
    let priority: Priority = priority.parse()?;
    if db.set_priority(ctx, id, priority)? {
        println!("Task #{} is now {}", id, priority.label().to_lowercase());
    } else {
        bail!("Task #{} not found", id);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Swap a task with its neighbour in the same list (pending or completed)
/// of `date`. Returns false when it is already at that end of the list.
pub fn move_task(
    db: &Database,
    ctx: &ViewContext,
    id: i64,
    direction: Direction,
    date: NaiveDate,
    filter: DayFilter,
) -> Result<bool> {
    let tasks = db.list_tasks(ctx, false)?;
    let log = CompletionLog::from_records(&db.list_completions(ctx, date, date)?);
    let board = split_day(&tasks, &log, date, filter);

    let Some(list) = [&board.pending, &board.completed]
        .into_iter()
        .find(|list| list.iter().any(|t| t.id == id))
    else {
        bail!("Task #{} is not on the list for {}", id, format_date(date));
    };
    let pos = list.iter().position(|t| t.id == id).unwrap_or_default();
    let neighbour = match direction {
        Direction::Up => pos.checked_sub(1),
        Direction::Down => Some(pos + 1).filter(|p| *p < list.len()),
    };

    let Some(other) = neighbour.map(|p| list[p]) else {
        println!("Task #{} is already at the {}", id, match direction {
            Direction::Up => "top",
            Direction::Down => "bottom",
        });
        return Ok(false);
    };

    db.swap_order(ctx, list[pos], other)?;
    println!("Moved task #{} past #{}", id, other.id);
    Ok(true)
}

pub(crate) fn schedule_label(task: &Task) -> String {
    let days = if task.is_daily {
        "weekdays".to_string()
    } else {
        task.selected_days
            .iter()
            .map(|d| weekday_name(*d))
            .collect::<Vec<_>>()
            .join(",")
    };
    match task.repetition {
        Repetition::Continuous => days,
        Repetition::ByWeeks(n) => format!("{} for {} week(s)", days, n),
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    }
}
