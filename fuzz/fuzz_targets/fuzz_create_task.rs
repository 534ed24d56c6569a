#![no_main]

//! Fuzz target for task creation and the day evaluator.
//!
//! Arbitrary names, weekday lists and week counts go through the same
//! validation as `taskmap task add`. Whatever is accepted is stored, read
//! back and evaluated over a range of days; nothing may panic and every
//! day summary must keep completed <= total.

use arbitrary::Arbitrary;
use chrono::{Days, NaiveDate};
use libfuzzer_sys::fuzz_target;
use tempfile::tempdir;

use taskmap::aggregate::{day, CompletionLog};
use taskmap::commands::task::build;
use taskmap::context::ViewContext;
use taskmap::db::Database;
use taskmap::models::Role;
use taskmap::recurrence::DayFilter;

#[derive(Arbitrary, Debug)]
struct TaskInput {
    name: String,
    category: Option<String>,
    days: Option<String>,
    weeks: Option<u8>,
    shift: u8,
    priority: u8,
    /// Offset in days from 2024-01-01 of the first evaluated day
    start: u16,
    /// Days to mark complete, as offsets from `start`
    completions: Vec<u8>,
}

const SHIFTS: [&str; 4] = ["any", "morning", "afternoon", "evening"];
const PRIORITIES: [&str; 4] = [
    "important-urgent",
    "important-not-urgent",
    "urgent-not-important",
    "not-urgent-not-important",
];

fuzz_target!(|input: TaskInput| {
    let Ok(new_task) = build(
        &input.name,
        None,
        input.days.as_deref(),
        input.weeks.map(u32::from),
        SHIFTS[usize::from(input.shift) % SHIFTS.len()],
        PRIORITIES[usize::from(input.priority) % PRIORITIES.len()],
    ) else {
        return;
    };

    let dir = match tempdir() {
        Ok(d) => d,
        Err(_) => return,
    };
    let db = match Database::open(&dir.path().join("tasks.db")) {
        Ok(d) => d,
        Err(_) => return,
    };
    let Ok(user_id) = db.create_user("Fuzz", "fuzz@example.com", Role::Normal, "N/A", "N/A") else {
        return;
    };
    let Ok(Some(user)) = db.get_user(user_id) else {
        return;
    };
    let ctx = ViewContext::own(user);

    if let Some(category) = input.category.as_deref() {
        let _ = db.create_category(&ctx, category, "#D1D5DB");
    }
    let Ok(id) = db.create_task(&ctx, &new_task) else {
        return;
    };
    let Ok(Some(stored)) = db.get_task(&ctx, id) else {
        panic!("created task #{} cannot be read back", id);
    };
    assert_eq!(stored.name, new_task.name);
    assert_eq!(stored.selected_days, new_task.selected_days);

    let Some(first) = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.checked_add_days(Days::new(u64::from(input.start))))
    else {
        return;
    };

    let mut log = CompletionLog::new();
    for offset in input.completions.iter().take(32) {
        if let Some(date) = first.checked_add_days(Days::new(u64::from(*offset))) {
            log.insert(id, date);
        }
    }

    let tasks = [stored];
    for offset in 0..64 {
        let Some(date) = first.checked_add_days(Days::new(offset)) else {
            break;
        };
        let summary = day(&tasks, &log, date, DayFilter::Scheduled);
        assert!(summary.completed <= summary.total);
    }
});
