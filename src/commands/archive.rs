use anyhow::{bail, Result};
use tracing::info;

use crate::commands::require_task;
use crate::commands::task::{schedule_label, truncate};
use crate::context::ViewContext;
use crate::db::Database;

pub fn archive(db: &Database, ctx: &ViewContext, id: i64) -> Result<()> {
    let task = require_task(db, ctx, id)?;

    if task.is_archived {
        bail!("Task #{} is already archived", id);
    }

    if db.archive_task(ctx, id)? {
        println!("Archived task #{}: {}", id, task.name);
    } else {
        println!("Task #{} could not be archived", id);
    }

    Ok(())
}

pub fn unarchive(db: &Database, ctx: &ViewContext, id: i64) -> Result<()> {
    if db.unarchive_task(ctx, id)? {
        println!("Restored task #{}", id);
    } else {
        bail!("Task #{} not found or not archived", id);
    }

    Ok(())
}

pub fn list(db: &Database, ctx: &ViewContext) -> Result<()> {
    let tasks: Vec<_> = db
        .list_tasks(ctx, true)?
        .into_iter()
        .filter(|t| t.is_archived)
        .collect();

    if tasks.is_empty() {
        println!("No archived tasks.");
        return Ok(());
    }

    println!("Archived tasks:\n");
    for task in tasks {
        println!(
            "#{:<4} {:<40} {}",
            task.id,
            truncate(&task.name, 40),
            schedule_label(&task)
        );
    }

    Ok(())
}

/// Archive every active task of the viewed user.
pub fn archive_all(db: &Database, ctx: &ViewContext) -> Result<usize> {
    let count = db.archive_all(ctx)?;
    if count > 0 {
        info!(count, user = %ctx.subject().email, "archived all tasks");
        println!("Archived {} task(s)", count);
    } else {
        println!("No active tasks to archive");
    }

    Ok(count)
}
