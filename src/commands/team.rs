use anyhow::Result;
use chrono::{Datelike, NaiveDate};

use crate::aggregate::{team_overview, UserOverview};
use crate::commands::task::truncate;
use crate::config::Config;
use crate::context::ViewContext;
use crate::dates::{month_bounds, week_bounds};
use crate::db::Database;

/// Day, week and month productivity of every user. Master only.
pub fn overview(
    db: &Database,
    ctx: &ViewContext,
    config: &Config,
    date: NaiveDate,
) -> Result<Vec<UserOverview>> {
    ctx.require_master()?;

    let (week_start, week_end) = week_bounds(date);
    let (from, to) = match month_bounds(date.year(), date.month()) {
        Some((first, last)) => (first.min(week_start), last.max(week_end)),
        None => (week_start, week_end),
    };

    let users = db.list_users()?;
    let tasks = db.list_all_tasks(ctx)?;
    let completions = db.list_all_completions(ctx, from, to)?;
    Ok(team_overview(
        &users,
        &tasks,
        &completions,
        date,
        config.completion_source,
        config.day_filter(),
    ))
}

pub fn run(db: &Database, ctx: &ViewContext, config: &Config, date: NaiveDate) -> Result<()> {
    let rows = overview(db, ctx, config, date)?;

    println!("{:<30} {:>6} {:>6} {:>6}", "User", "Day", "Week", "Month");
    for row in rows {
        println!(
            "{:<30} {:>5}% {:>5}% {:>5}%",
            truncate(&row.name, 30),
            row.daily.rounded(),
            row.weekly.rounded(),
            row.monthly.rounded()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{add_user, daily_task, setup_test_db};
    use crate::dates::today;
    use crate::models::Role;

    #[test]
    fn test_requires_master() {
        let (db, _dir) = setup_test_db();
        let ana = add_user(&db, "ana@example.com", Role::Normal);
        assert!(overview(&db, &ana, &Config::default(), today()).is_err());
    }

    #[test]
    fn test_overview_per_user() {
        let (db, _dir) = setup_test_db();
        let boss = add_user(&db, "boss@example.com", Role::Master);
        let ana = add_user(&db, "ana@example.com", Role::Normal);
        let bruno = add_user(&db, "bruno@example.com", Role::Normal);

        let a = db.create_task(&ana, &daily_task("A")).unwrap();
        db.create_task(&bruno, &daily_task("B")).unwrap();
        let archived = db.create_task(&bruno, &daily_task("Old")).unwrap();
        db.archive_task(&bruno, archived).unwrap();
        let date = today();
        db.toggle_completion(&ana, a, date).unwrap();

        let rows = overview(&db, &boss, &Config::default(), date).unwrap();
        assert_eq!(rows.len(), 3);
        let ana_row = rows.iter().find(|r| r.user_id == ana.subject_id()).unwrap();
        let bruno_row = rows.iter().find(|r| r.user_id == bruno.subject_id()).unwrap();

        // Both tasks were created today, so they belong to this week and month.
        assert_eq!(ana_row.weekly.completed, 1);
        assert_eq!(ana_row.monthly.total, 1);
        assert_eq!(bruno_row.monthly.total, 1);
        assert_eq!(bruno_row.monthly.completed, 0);
        assert!(run(&db, &boss, &Config::default(), date).is_ok());
    }

    #[test]
    fn test_overview_honours_hide_before_creation() {
        let (db, _dir) = setup_test_db();
        let boss = add_user(&db, "boss@example.com", Role::Master);
        let ana = add_user(&db, "ana@example.com", Role::Normal);
        db.create_task(&ana, &daily_task("A")).unwrap();
        let monday = crate::dates::parse_date("2024-03-04").unwrap();
        let hiding = Config {
            hide_before_creation: true,
            ..Config::default()
        };

        let daily_total = |config: &Config| {
            overview(&db, &boss, config, monday)
                .unwrap()
                .into_iter()
                .find(|r| r.user_id == ana.subject_id())
                .unwrap()
                .daily
                .total
        };
        assert_eq!(daily_total(&Config::default()), 1);
        assert_eq!(daily_total(&hiding), 0);
    }
}
