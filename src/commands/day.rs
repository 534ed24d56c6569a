use anyhow::Result;
use chrono::NaiveDate;
use std::fmt::Write as _;

use crate::aggregate::split_day;
use crate::commands::task::truncate;
use crate::config::Config;
use crate::context::ViewContext;
use crate::dates::{format_date, weekday_index, weekday_name};
use crate::db::Database;
use crate::live::DayBoard;
use crate::models::Task;

pub fn run(db: &Database, ctx: &ViewContext, config: &Config, date: NaiveDate) -> Result<()> {
    let board = DayBoard::open(db, ctx, date, config.day_filter())?;
    print!("{}", render(&board, &ctx.banner()));
    Ok(())
}

fn render(board: &DayBoard, banner: &str) -> String {
    let date = board.date();
    let tasks = board.tasks();
    let day = split_day(&tasks, &board.log(), date, board.filter());
    let summary = day.summary();

    let mut out = String::new();
    let _ = writeln!(out, "{}", banner);
    let _ = writeln!(
        out,
        "{} {}: {}/{} done ({}%)\n",
        weekday_name(weekday_index(date)),
        format_date(date),
        summary.completed,
        summary.total,
        summary.rounded()
    );

    if summary.total == 0 {
        let _ = writeln!(out, "Nothing scheduled.");
        return out;
    }

    write_section(&mut out, "Pending", &day.pending, "[ ]");
    write_section(&mut out, "Completed", &day.completed, "[x]");
    out
}

fn write_section(out: &mut String, title: &str, tasks: &[&Task], mark: &str) {
    if tasks.is_empty() {
        return;
    }
    let _ = writeln!(out, "{}:", title);
    for task in tasks {
        let _ = writeln!(
            out,
            "  {} #{:<4} {:<40} {:<9} {}",
            mark,
            task.id,
            truncate(&task.name, 40),
            task.shift.as_str(),
            task.priority
        );
    }
    let _ = writeln!(out);
}
