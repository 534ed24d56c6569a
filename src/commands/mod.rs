pub mod archive;
pub mod category;
pub mod day;
pub mod done;
pub mod export;
pub mod init;
pub mod report;
pub mod task;
pub mod team;
pub mod timer;
pub mod user;

use anyhow::{bail, Result};
use chrono::NaiveDate;

use crate::context::ViewContext;
use crate::dates::{parse_date, today};
use crate::db::Database;
use crate::models::Task;

/// Build the context a command runs in from the acting user's email and an
/// optional user to view.
pub fn resolve_context(
    db: &Database,
    actor_email: Option<&str>,
    view_email: Option<&str>,
) -> Result<ViewContext> {
    let Some(email) = actor_email else {
        bail!("No user selected. Pass --user <email>, set TASKMAP_USER, or set default_user in config.json");
    };
    let Some(actor) = db.get_user_by_email(email)? else {
        bail!("User '{}' not found. Add it with 'taskmap user add'", email);
    };

    match view_email {
        None => Ok(ViewContext::own(actor)),
        Some(other) => {
            let Some(subject) = db.get_user_by_email(other)? else {
                bail!("User '{}' not found", other);
            };
            ViewContext::viewing(actor, subject)
        }
    }
}

/// `--date` argument, defaulting to today.
pub fn date_or_today(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(s) => parse_date(s),
        None => Ok(today()),
    }
}

pub(crate) fn require_task(db: &Database, ctx: &ViewContext, id: i64) -> Result<Task> {
    match db.get_task(ctx, id)? {
        Some(task) => Ok(task),
        None => bail!("Task #{} not found", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::{add_user, setup_test_db};
    use crate::models::Role;

    #[test]
    fn test_resolve_own_context() {
        let (db, _dir) = setup_test_db();
        add_user(&db, "ana@example.com", Role::Normal);
        let ctx = resolve_context(&db, Some("ana@example.com"), None).unwrap();
        assert!(!ctx.is_supervising());
    }

    #[test]
    fn test_resolve_requires_user() {
        let (db, _dir) = setup_test_db();
        assert!(resolve_context(&db, None, None).is_err());
        assert!(resolve_context(&db, Some("nobody@example.com"), None).is_err());
    }

    #[test]
    fn test_resolve_view_needs_master() {
        let (db, _dir) = setup_test_db();
        add_user(&db, "boss@example.com", Role::Master);
        add_user(&db, "ana@example.com", Role::Normal);

        let ctx = resolve_context(&db, Some("boss@example.com"), Some("ana@example.com")).unwrap();
        assert_eq!(ctx.subject().email, "ana@example.com");
        assert!(resolve_context(&db, Some("ana@example.com"), Some("boss@example.com")).is_err());
    }

    #[test]
    fn test_date_or_today() {
        assert_eq!(date_or_today(None).unwrap(), today());
        assert!(date_or_today(Some("2024-13-01")).is_err());
    }
}
