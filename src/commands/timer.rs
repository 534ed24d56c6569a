use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::commands::require_task;
use crate::context::ViewContext;
use crate::dates::format_duration;
use crate::db::Database;
use crate::timer::{Stopwatch, TimerStatus, TimerTarget};

fn describe(target: &TimerTarget) -> String {
    match target {
        TimerTarget::Task { id, name } => format!("#{} {}", id, name),
        TimerTarget::OffTask => "off-task time".to_string(),
    }
}

/// Start a stopwatch, or resume the paused one.
pub fn start(
    db: &Database,
    ctx: &ViewContext,
    task_id: Option<i64>,
    off_task: bool,
    now: DateTime<Local>,
) -> Result<()> {
    if let Some(mut sw) = db.load_timer(ctx)? {
        let same_target = match (&sw.target, task_id) {
            (_, None) if !off_task => true,
            (TimerTarget::OffTask, None) => off_task,
            (TimerTarget::Task { id, .. }, Some(requested)) => *id == requested && !off_task,
            _ => false,
        };
        if sw.status == TimerStatus::Paused && same_target {
            sw.resume(now)?;
            db.save_timer(ctx, &sw)?;
            println!("Resumed timer for {}", describe(&sw.target));
            return Ok(());
        }
        bail!(
            "Timer already {} for {}. Finalize it first with 'taskmap timer finalize'.",
            sw.status.as_str(),
            describe(&sw.target)
        );
    }

    let target = match (task_id, off_task) {
        (Some(_), true) => bail!("Give either a task id or --off, not both"),
        (None, true) => TimerTarget::OffTask,
        (Some(id), false) => {
            let task = require_task(db, ctx, id)?;
            if task.is_archived {
                bail!("Task #{} is archived", id);
            }
            TimerTarget::Task {
                id,
                name: task.name,
            }
        }
        (None, false) => bail!("Give a task id to time, or --off for off-task time"),
    };

    let sw = Stopwatch::start(target, now.date_naive(), now);
    db.save_timer(ctx, &sw)?;
    println!("Started timer for {}", describe(&sw.target));
    println!("Run 'taskmap timer finalize' when done.");

    Ok(())
}

pub fn pause(db: &Database, ctx: &ViewContext, now: DateTime<Local>) -> Result<()> {
    let Some(mut sw) = db.load_timer(ctx)? else {
        bail!("No timer running. Start one with 'taskmap timer start <task>'.");
    };
    sw.pause(now)?;
    db.save_timer(ctx, &sw)?;
    println!(
        "Paused timer for {} at {}",
        describe(&sw.target),
        format_duration(sw.accumulated)
    );
    Ok(())
}

/// Stop the stopwatch and log the session. Returns the seconds recorded,
/// or `None` when there was nothing to record.
pub fn finalize(db: &Database, ctx: &ViewContext, now: DateTime<Local>) -> Result<Option<i64>> {
    let Some(sw) = db.load_timer(ctx)? else {
        bail!("No timer running. Start one with 'taskmap timer start <task>'.");
    };
    let label = describe(&sw.target);

    let recorded = match sw.finalize(now) {
        Some(session) => {
            db.record_session(ctx, &session)?;
            info!(duration = session.duration, "session recorded");
            println!("Stopped timer for {}", label);
            println!("Time spent: {}", format_duration(session.duration));
            Some(session.duration)
        }
        None => {
            println!("Stopped timer for {}; no time recorded", label);
            None
        }
    };
    db.clear_timer(ctx)?;

    Ok(recorded)
}

pub fn status(db: &Database, ctx: &ViewContext, now: DateTime<Local>) -> Result<()> {
    match db.load_timer(ctx)? {
        Some(sw) => {
            println!("Timer {}: {}", sw.status.as_str(), describe(&sw.target));
            println!("Elapsed: {}", format_duration(sw.elapsed(now)));
        }
        None => {
            println!("No timer running.");
        }
    }

    Ok(())
}

/// Show the running stopwatch ticking until SIGINT or SIGTERM, then pause it
/// and save.
pub fn watch(db: &Database, ctx: &ViewContext) -> Result<()> {
    let Some(mut sw) = db.load_timer(ctx)? else {
        bail!("No timer running. Start one with 'taskmap timer start <task>'.");
    };
    if sw.status != TimerStatus::Running {
        bail!("Timer is paused. Resume it with 'taskmap timer start'.");
    }

    let stop = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .context("Failed to register signal handler")?;
    }
    debug!("watching timer");

    let label = describe(&sw.target);
    let mut stdout = io::stdout().lock();
    while !stop.load(Ordering::Relaxed) {
        write!(stdout, "\r{}  {}", label, format_duration(sw.elapsed(Local::now())))?;
        stdout.flush()?;
        std::thread::sleep(Duration::from_millis(250));
    }

    sw.pause(Local::now())?;
    db.save_timer(ctx, &sw)?;
    writeln!(stdout)?;
    writeln!(stdout, "Paused at {}", format_duration(sw.accumulated))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{add_user, daily_task, setup_test_db};
    use crate::models::Role;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn test_start_requires_target() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let now = Local::now();
        assert!(start(&db, &ctx, None, false, now).is_err());
        assert!(start(&db, &ctx, Some(99), false, now).is_err());
        assert!(start(&db, &ctx, Some(1), true, now).is_err());
    }

    #[test]
    fn test_task_session_lifecycle() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let id = db.create_task(&ctx, &daily_task("Deep work")).unwrap();
        let t0 = Local::now();

        start(&db, &ctx, Some(id), false, t0).unwrap();
        assert!(start(&db, &ctx, Some(id), false, t0).is_err());
        pause(&db, &ctx, t0 + ChronoDuration::seconds(60)).unwrap();
        assert!(pause(&db, &ctx, t0 + ChronoDuration::seconds(61)).is_err());
        start(&db, &ctx, None, false, t0 + ChronoDuration::seconds(120)).unwrap();

        let recorded = finalize(&db, &ctx, t0 + ChronoDuration::seconds(150)).unwrap();
        assert_eq!(recorded, Some(90));
        assert!(db.load_timer(&ctx).unwrap().is_none());

        let date = t0.date_naive();
        let sessions = db.list_task_sessions(&ctx, date, date).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].task_name, "Deep work");
    }

    #[test]
    fn test_paused_timer_blocks_other_target() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let id = db.create_task(&ctx, &daily_task("Deep work")).unwrap();
        let t0 = Local::now();

        start(&db, &ctx, None, true, t0).unwrap();
        pause(&db, &ctx, t0 + ChronoDuration::seconds(5)).unwrap();
        assert!(start(&db, &ctx, Some(id), false, t0).is_err());
        start(&db, &ctx, None, true, t0 + ChronoDuration::seconds(10)).unwrap();
    }

    #[test]
    fn test_zero_length_session_not_recorded() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let t0 = Local::now();

        start(&db, &ctx, None, true, t0).unwrap();
        assert_eq!(finalize(&db, &ctx, t0).unwrap(), None);
        assert!(db.load_timer(&ctx).unwrap().is_none());
        let date = t0.date_naive();
        assert!(db.list_off_task_sessions(&ctx, date, date).unwrap().is_empty());
    }

    #[test]
    fn test_finalize_without_timer() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        assert!(finalize(&db, &ctx, Local::now()).is_err());
        assert!(status(&db, &ctx, Local::now()).is_ok());
    }

    #[test]
    fn test_watch_needs_running_timer() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        assert!(watch(&db, &ctx).is_err());

        let t0 = Local::now();
        start(&db, &ctx, None, true, t0).unwrap();
        pause(&db, &ctx, t0 + ChronoDuration::seconds(1)).unwrap();
        assert!(watch(&db, &ctx).is_err());
    }
}
