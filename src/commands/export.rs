use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

use crate::aggregate::CompletionLog;
use crate::commands::task::schedule_label;
use crate::context::ViewContext;
use crate::dates::format_date;
use crate::db::Database;
use crate::models::{Category, DailyCompletion, OffTaskSession, Task, TaskSession, User};
use crate::recurrence::DayFilter;

#[derive(Serialize, Deserialize)]
pub struct ExportData {
    pub version: i32,
    pub exported_at: String,
    pub user: User,
    pub categories: Vec<Category>,
    pub tasks: Vec<Task>,
    pub completions: Vec<DailyCompletion>,
    pub task_sessions: Vec<TaskSession>,
    pub off_task_sessions: Vec<OffTaskSession>,
}

pub fn collect(db: &Database, ctx: &ViewContext) -> Result<ExportData> {
    let history = db.history(ctx)?;
    Ok(ExportData {
        version: 1,
        exported_at: chrono::Local::now().to_rfc3339(),
        user: ctx.subject().clone(),
        categories: db.list_categories(ctx)?,
        tasks: db.list_tasks(ctx, true)?,
        completions: history.completions,
        task_sessions: history.task_sessions,
        off_task_sessions: history.off_task_sessions,
    })
}

fn write_output(content: &str, output_path: Option<&str>, what: &str) -> Result<()> {
    match output_path {
        Some(path) => {
            fs::write(path, content).context("Failed to write export file")?;
            eprintln!("Exported {} to {}", what, path);
        }
        None => {
            let mut stdout = io::stdout().lock();
            writeln!(stdout, "{}", content)?;
        }
    }
    Ok(())
}

pub fn run_json(db: &Database, ctx: &ViewContext, output_path: Option<&str>) -> Result<()> {
    let data = collect(db, ctx)?;
    let json = serde_json::to_string_pretty(&data)?;
    write_output(
        &json,
        output_path,
        &format!("{} tasks of {}", data.tasks.len(), data.user.email),
    )
}

/// Checklist of the active tasks listed on `date`, grouped by category.
pub fn run_markdown(
    db: &Database,
    ctx: &ViewContext,
    date: NaiveDate,
    filter: DayFilter,
    output_path: Option<&str>,
) -> Result<()> {
    let tasks = db.list_tasks(ctx, false)?;
    let log = CompletionLog::from_records(&db.list_completions(ctx, date, date)?);
    let md = render_markdown(ctx.subject(), &tasks, &log, date, filter);
    write_output(&md, output_path, &format!("checklist for {}", format_date(date)))
}

fn render_markdown(
    user: &User,
    tasks: &[Task],
    log: &CompletionLog,
    date: NaiveDate,
    filter: DayFilter,
) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Tasks of {}\n\n", user.name));
    md.push_str(&format!("Date: {}\n\n", format_date(date)));

    let scheduled: Vec<&Task> = tasks.iter().filter(|t| filter.shows(t, date)).collect();
    if scheduled.is_empty() {
        md.push_str("Nothing scheduled.\n");
        return md;
    }

    let mut categories: Vec<&str> = scheduled.iter().map(|t| t.category.as_str()).collect();
    categories.sort_unstable();
    categories.dedup();

    for category in categories {
        let heading = if category.is_empty() {
            "Uncategorized"
        } else {
            category
        };
        md.push_str(&format!("## {}\n\n", heading));
        for task in scheduled.iter().filter(|t| t.category == category) {
            let checkbox = if log.contains(task.id, date) {
                "[x]"
            } else {
                "[ ]"
            };
            md.push_str(&format!(
                "- {} #{}: {} ({}, {})\n",
                checkbox,
                task.id,
                task.name,
                schedule_label(task),
                task.priority.label()
            ));
        }
        md.push('\n');
    }

    md
}
