use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, warn};

use crate::context::ViewContext;
use crate::dates::{format_date, parse_date};
use crate::feed::{Change, ChangeFeed, Collection, Snapshot, Subscription, Watch};
use crate::models::{
    Category, DailyCompletion, NewTask, OffTaskSession, Priority, Repetition, Role, Shift, Task,
    TaskSession, User,
};
use crate::timer::{FinishedSession, Stopwatch, TimerStatus, TimerTarget};

const SCHEMA_VERSION: i32 = 1;

const USER_COLUMNS: &str = "id, name, email, role, sector, position, created_at";
const CATEGORY_COLUMNS: &str = "id, user_id, name, color, created_at";
const TASK_COLUMNS: &str = "id, user_id, task_name, category, is_daily, selected_days, repeat_type, num_weeks, shift, priority, completed, created_at, order_index, is_archived";
const SESSION_COLUMNS: &str =
    "id, user_id, task_id, task_name, duration, start_time, end_time, completion_date";
const OFF_SESSION_COLUMNS: &str =
    "id, user_id, duration, start_time, end_time, completion_date";

pub struct History {
    pub completions: Vec<DailyCompletion>,
    pub task_sessions: Vec<TaskSession>,
    pub off_task_sessions: Vec<OffTaskSession>,
}

pub struct Database {
    conn: Connection,
    feed: ChangeFeed,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open database")?;
        let db = Database {
            conn,
            feed: ChangeFeed::new(),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            debug!(from = version, to = SCHEMA_VERSION, "upgrading schema");
            self.conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL DEFAULT 'normal',
                    sector TEXT NOT NULL DEFAULT 'N/A',
                    position TEXT NOT NULL DEFAULT 'N/A',
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    color TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, name),
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    task_name TEXT NOT NULL,
                    category TEXT NOT NULL DEFAULT '',
                    is_daily INTEGER NOT NULL DEFAULT 1,
                    selected_days TEXT NOT NULL DEFAULT '[]',
                    repeat_type TEXT NOT NULL DEFAULT 'continuous',
                    num_weeks INTEGER,
                    shift TEXT NOT NULL DEFAULT 'any',
                    priority TEXT NOT NULL DEFAULT 'important-urgent',
                    completed INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT,
                    order_index INTEGER NOT NULL,
                    is_archived INTEGER NOT NULL DEFAULT 0,
                    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
                );

                -- One row per task per calendar day it was done
                CREATE TABLE IF NOT EXISTS daily_completions (
                    task_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    completion_date TEXT NOT NULL,
                    completion_timestamp TEXT,
                    PRIMARY KEY (task_id, completion_date),
                    FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS task_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    task_id INTEGER NOT NULL,
                    task_name TEXT NOT NULL,
                    duration INTEGER NOT NULL,
                    start_time TEXT,
                    end_time TEXT,
                    completion_date TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS off_task_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL,
                    duration INTEGER NOT NULL,
                    start_time TEXT,
                    end_time TEXT,
                    completion_date TEXT NOT NULL
                );

                -- At most one open stopwatch per user
                CREATE TABLE IF NOT EXISTS active_timers (
                    user_id INTEGER PRIMARY KEY,
                    task_id INTEGER,
                    task_name TEXT,
                    status TEXT NOT NULL,
                    started_at TEXT NOT NULL,
                    running_since TEXT,
                    accumulated INTEGER NOT NULL DEFAULT 0,
                    timer_date TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id);
                CREATE INDEX IF NOT EXISTS idx_tasks_user ON tasks(user_id, order_index);
                CREATE INDEX IF NOT EXISTS idx_completions_user_date ON daily_completions(user_id, completion_date);
                CREATE INDEX IF NOT EXISTS idx_task_sessions_user_date ON task_sessions(user_id, completion_date);
                CREATE INDEX IF NOT EXISTS idx_off_sessions_user_date ON off_task_sessions(user_id, completion_date);
                "#,
            )?;

            self.conn
                .execute_batch(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))?;
        }

        self.conn.execute("PRAGMA foreign_keys = ON", [])?;

        Ok(())
    }

    // Change feed

    /// Subscribe to a query. The sink gets the current snapshot right away and
    /// a fresh one after every write touching the same collection and user.
    pub fn subscribe(
        &self,
        watch: Watch,
        sink: impl FnMut(&Snapshot) + 'static,
    ) -> Result<Subscription> {
        let initial = self.load_snapshot(&watch)?;
        let subscription = self.feed.register(watch, Box::new(sink));
        self.feed.deliver(subscription.id(), &initial);
        Ok(subscription)
    }

    fn load_snapshot(&self, watch: &Watch) -> Result<Snapshot> {
        Ok(match *watch {
            Watch::Categories { user_id } => Snapshot::Categories(self.categories_of(user_id)?),
            Watch::Tasks { user_id } => Snapshot::Tasks(self.tasks_of(user_id, false)?),
            Watch::Completions { user_id, date } => {
                Snapshot::Completions(self.completions_of(user_id, date, date)?)
            }
            Watch::TaskSessions { user_id, date } => {
                Snapshot::TaskSessions(self.task_sessions_of(user_id, date, date)?)
            }
        })
    }

    fn notify(&self, collection: Collection, user_id: i64) {
        let change = Change {
            collection,
            user_id,
        };
        for (id, watch) in self.feed.interested(&change) {
            match self.load_snapshot(&watch) {
                Ok(snapshot) => self.feed.deliver(id, &snapshot),
                Err(e) => warn!(error = %e, ?watch, "failed to refresh subscription"),
            }
        }
    }

    // Users

    pub fn create_user(
        &self,
        name: &str,
        email: &str,
        role: Role,
        sector: &str,
        position: &str,
    ) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO users (name, email, role, sector, position, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![name, email, role.as_str(), sector, position, now],
            )
            .with_context(|| format!("Failed to create user '{}'", email))?;
        let id = self.conn.last_insert_rowid();
        debug!(id, email, "created user");
        self.notify(Collection::Users, id);
        Ok(id)
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS);
        Ok(self.conn.query_row(&sql, [id], row_to_user).optional()?)
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS);
        Ok(self.conn.query_row(&sql, [email], row_to_user).optional()?)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY created_at, id", USER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn update_user(
        &self,
        id: i64,
        name: Option<&str>,
        sector: Option<&str>,
        position: Option<&str>,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET name = COALESCE(?1, name), sector = COALESCE(?2, sector), position = COALESCE(?3, position) WHERE id = ?4",
            params![name, sector, position, id],
        )?;
        if rows > 0 {
            self.notify(Collection::Users, id);
        }
        Ok(rows > 0)
    }

    pub fn set_role(&self, id: i64, role: Role) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), id],
        )?;
        if rows > 0 {
            self.notify(Collection::Users, id);
        }
        Ok(rows > 0)
    }

    // Categories

    pub fn create_category(&self, ctx: &ViewContext, name: &str, color: &str) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO categories (user_id, name, color, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![ctx.subject_id(), name, color, now],
            )
            .with_context(|| format!("Failed to create category '{}'", name))?;
        let id = self.conn.last_insert_rowid();
        self.notify(Collection::Categories, ctx.subject_id());
        Ok(id)
    }

    pub fn get_category(&self, ctx: &ViewContext, id: i64) -> Result<Option<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE id = ?1 AND user_id = ?2",
            CATEGORY_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id, ctx.subject_id()], row_to_category)
            .optional()?)
    }

    pub fn list_categories(&self, ctx: &ViewContext) -> Result<Vec<Category>> {
        self.categories_of(ctx.subject_id())
    }

    fn categories_of(&self, user_id: i64) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE user_id = ?1 ORDER BY created_at, id",
            CATEGORY_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let categories = stmt
            .query_map([user_id], row_to_category)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    /// Rename and/or recolor a category. A rename carries over to the tasks
    /// filed under the old name.
    pub fn update_category(
        &self,
        ctx: &ViewContext,
        id: i64,
        name: Option<&str>,
        color: Option<&str>,
    ) -> Result<bool> {
        let Some(existing) = self.get_category(ctx, id)? else {
            return Ok(false);
        };
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE categories SET name = COALESCE(?1, name), color = COALESCE(?2, color) WHERE id = ?3 AND user_id = ?4",
            params![name, color, id, ctx.subject_id()],
        )?;
        if let Some(new_name) = name {
            tx.execute(
                "UPDATE tasks SET category = ?1 WHERE user_id = ?2 AND category = ?3",
                params![new_name, ctx.subject_id(), existing.name],
            )?;
        }
        tx.commit()?;
        self.notify(Collection::Categories, ctx.subject_id());
        if name.is_some() {
            self.notify(Collection::Tasks, ctx.subject_id());
        }
        Ok(true)
    }

    pub fn delete_category(&self, ctx: &ViewContext, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM categories WHERE id = ?1 AND user_id = ?2",
            params![id, ctx.subject_id()],
        )?;
        if rows > 0 {
            self.notify(Collection::Categories, ctx.subject_id());
        }
        Ok(rows > 0)
    }

    // Tasks

    pub fn create_task(&self, ctx: &ViewContext, task: &NewTask) -> Result<i64> {
        let now = Local::now();
        // Creation time in milliseconds puts new tasks at the end of the list.
        let last: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(order_index), 0) FROM tasks WHERE user_id = ?1",
            [ctx.subject_id()],
            |row| row.get(0),
        )?;
        let order_index = now.timestamp_millis().max(last + 1);
        let selected_days = serde_json::to_string(&task.selected_days)?;
        self.conn.execute(
            "INSERT INTO tasks (user_id, task_name, category, is_daily, selected_days, repeat_type, num_weeks, shift, priority, completed, created_at, order_index, is_archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?11, 0)",
            params![
                ctx.subject_id(),
                task.name,
                task.category,
                task.is_daily,
                selected_days,
                task.repetition.repeat_type(),
                task.repetition.num_weeks(),
                task.shift.as_str(),
                task.priority.as_str(),
                now.to_rfc3339(),
                order_index,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, user_id = ctx.subject_id(), "created task");
        self.notify(Collection::Tasks, ctx.subject_id());
        Ok(id)
    }

    pub fn get_task(&self, ctx: &ViewContext, id: i64) -> Result<Option<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE id = ?1 AND user_id = ?2",
            TASK_COLUMNS
        );
        Ok(self
            .conn
            .query_row(&sql, params![id, ctx.subject_id()], row_to_task)
            .optional()?)
    }

    /// The viewed user's tasks in manual order.
    pub fn list_tasks(&self, ctx: &ViewContext, include_archived: bool) -> Result<Vec<Task>> {
        self.tasks_of(ctx.subject_id(), include_archived)
    }

    fn tasks_of(&self, user_id: i64, include_archived: bool) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE user_id = ?1 AND (?2 OR is_archived = 0) ORDER BY order_index, id",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map(params![user_id, include_archived], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Active tasks of every user, for the master overview.
    pub fn list_all_tasks(&self, ctx: &ViewContext) -> Result<Vec<Task>> {
        ctx.require_master()?;
        let sql = format!(
            "SELECT {} FROM tasks WHERE is_archived = 0 ORDER BY user_id, order_index, id",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    pub fn update_task(
        &self,
        ctx: &ViewContext,
        id: i64,
        name: Option<&str>,
        category: Option<&str>,
        completed: Option<bool>,
    ) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE tasks SET task_name = COALESCE(?1, task_name), category = COALESCE(?2, category), completed = COALESCE(?3, completed) WHERE id = ?4 AND user_id = ?5",
            params![name, category, completed, id, ctx.subject_id()],
        )?;
        if rows > 0 {
            self.notify(Collection::Tasks, ctx.subject_id());
        }
        Ok(rows > 0)
    }

    pub fn set_priority(&self, ctx: &ViewContext, id: i64, priority: Priority) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE tasks SET priority = ?1 WHERE id = ?2 AND user_id = ?3",
            params![priority.as_str(), id, ctx.subject_id()],
        )?;
        if rows > 0 {
            self.notify(Collection::Tasks, ctx.subject_id());
        }
        Ok(rows > 0)
    }

    /// Exchange the order indexes of two tasks in one transaction.
    pub fn swap_order(&self, ctx: &ViewContext, a: &Task, b: &Task) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for (task, new_index) in [(a, b.order_index), (b, a.order_index)] {
            let rows = tx.execute(
                "UPDATE tasks SET order_index = ?1 WHERE id = ?2 AND user_id = ?3",
                params![new_index, task.id, ctx.subject_id()],
            )?;
            if rows == 0 {
                bail!("Task #{} not found", task.id);
            }
        }
        tx.commit().context("Failed to save the new task order")?;
        self.notify(Collection::Tasks, ctx.subject_id());
        Ok(())
    }

    pub fn archive_task(&self, ctx: &ViewContext, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE tasks SET is_archived = 1 WHERE id = ?1 AND user_id = ?2 AND is_archived = 0",
            params![id, ctx.subject_id()],
        )?;
        if rows > 0 {
            self.notify(Collection::Tasks, ctx.subject_id());
        }
        Ok(rows > 0)
    }

    pub fn unarchive_task(&self, ctx: &ViewContext, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "UPDATE tasks SET is_archived = 0 WHERE id = ?1 AND user_id = ?2 AND is_archived = 1",
            params![id, ctx.subject_id()],
        )?;
        if rows > 0 {
            self.notify(Collection::Tasks, ctx.subject_id());
        }
        Ok(rows > 0)
    }

    pub fn archive_all(&self, ctx: &ViewContext) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE tasks SET is_archived = 1 WHERE user_id = ?1 AND is_archived = 0",
            [ctx.subject_id()],
        )?;
        if rows > 0 {
            self.notify(Collection::Tasks, ctx.subject_id());
        }
        Ok(rows)
    }

    // Daily completions

    pub fn is_completed(&self, ctx: &ViewContext, task_id: i64, date: NaiveDate) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM daily_completions WHERE task_id = ?1 AND completion_date = ?2 AND user_id = ?3",
                params![task_id, format_date(date), ctx.subject_id()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Flip a task's completion for `date`. Returns the new state.
    pub fn toggle_completion(&self, ctx: &ViewContext, task_id: i64, date: NaiveDate) -> Result<bool> {
        if self.get_task(ctx, task_id)?.is_none() {
            bail!("Task #{} not found", task_id);
        }
        let day = format_date(date);
        let now_done = if self.is_completed(ctx, task_id, date)? {
            self.conn.execute(
                "DELETE FROM daily_completions WHERE task_id = ?1 AND completion_date = ?2",
                params![task_id, day],
            )?;
            false
        } else {
            self.conn.execute(
                "INSERT INTO daily_completions (task_id, user_id, completion_date, completion_timestamp) VALUES (?1, ?2, ?3, ?4)",
                params![task_id, ctx.subject_id(), day, Local::now().to_rfc3339()],
            )?;
            true
        };
        debug!(task_id, date = %day, done = now_done, "toggled completion");
        self.notify(Collection::DailyCompletions, ctx.subject_id());
        Ok(now_done)
    }

    /// Completions of the viewed user between two dates, inclusive.
    pub fn list_completions(
        &self,
        ctx: &ViewContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyCompletion>> {
        self.completions_of(ctx.subject_id(), Some(from), Some(to))
    }

    fn completions_of(
        &self,
        user_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<DailyCompletion>> {
        let mut stmt = self.conn.prepare(
            "SELECT task_id, user_id, completion_date, completion_timestamp FROM daily_completions
             WHERE user_id = ?1 AND (?2 IS NULL OR completion_date >= ?2) AND (?3 IS NULL OR completion_date <= ?3)
             ORDER BY completion_date, task_id",
        )?;
        let rows = stmt
            .query_map(
                params![user_id, from.map(format_date), to.map(format_date)],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Rows whose date does not parse cannot count toward any day.
        Ok(rows
            .into_iter()
            .filter_map(|(task_id, user_id, date, stamp)| {
                Some(DailyCompletion {
                    task_id,
                    user_id,
                    completion_date: parse_date(&date).ok()?,
                    completion_timestamp: stamp.and_then(parse_datetime),
                })
            })
            .collect())
    }

    /// Every user's completions between two dates, for the master overview.
    pub fn list_all_completions(
        &self,
        ctx: &ViewContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyCompletion>> {
        ctx.require_master()?;
        let mut all = Vec::new();
        for user in self.list_users()? {
            all.extend(self.completions_of(user.id, Some(from), Some(to))?);
        }
        Ok(all)
    }

    // Time tracking

    pub fn record_session(&self, ctx: &ViewContext, session: &FinishedSession) -> Result<i64> {
        let start = session.start_time.to_rfc3339();
        let end = session.end_time.to_rfc3339();
        let date = format_date(session.date);
        let collection = match &session.target {
            TimerTarget::Task { id, name } => {
                self.conn.execute(
                    "INSERT INTO task_sessions (user_id, task_id, task_name, duration, start_time, end_time, completion_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![ctx.subject_id(), id, name, session.duration, start, end, date],
                )?;
                Collection::TaskSessions
            }
            TimerTarget::OffTask => {
                self.conn.execute(
                    "INSERT INTO off_task_sessions (user_id, duration, start_time, end_time, completion_date) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![ctx.subject_id(), session.duration, start, end, date],
                )?;
                Collection::OffTaskSessions
            }
        };
        let id = self.conn.last_insert_rowid();
        self.notify(collection, ctx.subject_id());
        Ok(id)
    }

    pub fn list_task_sessions(
        &self,
        ctx: &ViewContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<TaskSession>> {
        self.task_sessions_of(ctx.subject_id(), Some(from), Some(to))
    }

    fn task_sessions_of(
        &self,
        user_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<TaskSession>> {
        let sql = format!(
            "SELECT {} FROM task_sessions WHERE user_id = ?1 AND (?2 IS NULL OR completion_date >= ?2) AND (?3 IS NULL OR completion_date <= ?3) ORDER BY completion_date, id",
            SESSION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(
                params![user_id, from.map(format_date), to.map(format_date)],
                row_to_task_session,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions.into_iter().flatten().collect())
    }

    pub fn list_off_task_sessions(
        &self,
        ctx: &ViewContext,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OffTaskSession>> {
        self.off_task_sessions_of(ctx.subject_id(), Some(from), Some(to))
    }

    fn off_task_sessions_of(
        &self,
        user_id: i64,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<OffTaskSession>> {
        let sql = format!(
            "SELECT {} FROM off_task_sessions WHERE user_id = ?1 AND (?2 IS NULL OR completion_date >= ?2) AND (?3 IS NULL OR completion_date <= ?3) ORDER BY completion_date, id",
            OFF_SESSION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let sessions = stmt
            .query_map(
                params![user_id, from.map(format_date), to.map(format_date)],
                row_to_off_task_session,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sessions.into_iter().flatten().collect())
    }

    /// Every completion and session of the viewed user, for export.
    pub fn history(&self, ctx: &ViewContext) -> Result<History> {
        let user_id = ctx.subject_id();
        Ok(History {
            completions: self.completions_of(user_id, None, None)?,
            task_sessions: self.task_sessions_of(user_id, None, None)?,
            off_task_sessions: self.off_task_sessions_of(user_id, None, None)?,
        })
    }

    pub fn load_timer(&self, ctx: &ViewContext) -> Result<Option<Stopwatch>> {
        let row = self
            .conn
            .query_row(
                "SELECT task_id, task_name, status, started_at, running_since, accumulated, timer_date FROM active_timers WHERE user_id = ?1",
                [ctx.subject_id()],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                },
            )
            .optional()?;

        let Some((task_id, task_name, status, started_at, running_since, accumulated, date)) = row
        else {
            return Ok(None);
        };
        let target = match task_id {
            Some(id) => TimerTarget::Task {
                id,
                name: task_name.unwrap_or_default(),
            },
            None => TimerTarget::OffTask,
        };
        let started_at = parse_datetime(started_at).context("Stored timer has a bad start time")?;
        Ok(Some(Stopwatch {
            target,
            status: TimerStatus::parse(&status),
            started_at,
            running_since: running_since.and_then(parse_datetime),
            accumulated,
            date: parse_date(&date)?,
        }))
    }

    pub fn save_timer(&self, ctx: &ViewContext, sw: &Stopwatch) -> Result<()> {
        let (task_id, task_name) = match &sw.target {
            TimerTarget::Task { id, name } => (Some(*id), Some(name.as_str())),
            TimerTarget::OffTask => (None, None),
        };
        self.conn.execute(
            "INSERT OR REPLACE INTO active_timers (user_id, task_id, task_name, status, started_at, running_since, accumulated, timer_date) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                ctx.subject_id(),
                task_id,
                task_name,
                sw.status.as_str(),
                sw.started_at.to_rfc3339(),
                sw.running_since.map(|t| t.to_rfc3339()),
                sw.accumulated,
                format_date(sw.date),
            ],
        )?;
        Ok(())
    }

    pub fn clear_timer(&self, ctx: &ViewContext) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM active_timers WHERE user_id = ?1", [ctx.subject_id()])?;
        Ok(rows > 0)
    }
}

fn parse_datetime(s: String) -> Option<DateTime<Local>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Local))
        .ok()
}

fn row_to_user(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        role: role.parse().unwrap_or(Role::Normal),
        sector: row.get(4)?,
        position: row.get(5)?,
        created_at: parse_datetime(row.get(6)?),
    })
}

fn row_to_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        created_at: parse_datetime(row.get(4)?),
    })
}

fn row_to_task(row: &Row) -> rusqlite::Result<Task> {
    let selected_days: String = row.get(5)?;
    let repeat_type: String = row.get(6)?;
    let shift: String = row.get(8)?;
    let priority: String = row.get(9)?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        is_daily: row.get(4)?,
        // A malformed weekday list means the task is never scheduled.
        selected_days: serde_json::from_str(&selected_days).unwrap_or_default(),
        repetition: Repetition::from_parts(&repeat_type, row.get(7)?),
        shift: shift.parse().unwrap_or(Shift::Any),
        priority: priority.parse().unwrap_or(Priority::ImportantUrgent),
        completed: row.get(10)?,
        created_at: row.get::<_, Option<String>>(11)?.and_then(parse_datetime),
        order_index: row.get(12)?,
        is_archived: row.get(13)?,
    })
}

fn row_to_task_session(row: &Row) -> rusqlite::Result<Option<TaskSession>> {
    let date: String = row.get(7)?;
    let Ok(completion_date) = parse_date(&date) else {
        return Ok(None);
    };
    Ok(Some(TaskSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_id: row.get(2)?,
        task_name: row.get(3)?,
        duration: row.get(4)?,
        start_time: row.get::<_, Option<String>>(5)?.and_then(parse_datetime),
        end_time: row.get::<_, Option<String>>(6)?.and_then(parse_datetime),
        completion_date,
    }))
}

fn row_to_off_task_session(row: &Row) -> rusqlite::Result<Option<OffTaskSession>> {
    let date: String = row.get(5)?;
    let Ok(completion_date) = parse_date(&date) else {
        return Ok(None);
    };
    Ok(Some(OffTaskSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        duration: row.get(2)?,
        start_time: row.get::<_, Option<String>>(3)?.and_then(parse_datetime),
        end_time: row.get::<_, Option<String>>(4)?.and_then(parse_datetime),
        completion_date,
    }))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dates::today;
    use std::cell::RefCell;
    use std::rc::Rc;
    use tempfile::tempdir;

    pub(crate) fn setup_test_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(&db_path).unwrap();
        (db, dir)
    }

    pub(crate) fn add_user(db: &Database, email: &str, role: Role) -> ViewContext {
        let id = db.create_user("Test user", email, role, "N/A", "N/A").unwrap();
        ViewContext::own(db.get_user(id).unwrap().unwrap())
    }

    pub(crate) fn daily_task(name: &str) -> NewTask {
        NewTask {
            name: name.to_string(),
            category: "General".to_string(),
            is_daily: true,
            selected_days: vec![],
            repetition: Repetition::Continuous,
            shift: Shift::Any,
            priority: Priority::ImportantUrgent,
        }
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let db = Database::open(&path).unwrap();
            add_user(&db, "ana@example.com", Role::Normal);
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (db, _dir) = setup_test_db();
        add_user(&db, "ana@example.com", Role::Normal);
        assert!(db
            .create_user("Other", "ana@example.com", Role::Normal, "N/A", "N/A")
            .is_err());
    }

    #[test]
    fn test_task_roundtrip() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let new = NewTask {
            is_daily: false,
            selected_days: vec![1, 3],
            repetition: Repetition::ByWeeks(4),
            shift: Shift::Morning,
            priority: Priority::UrgentNotImportant,
            ..daily_task("Check mail")
        };
        let id = db.create_task(&ctx, &new).unwrap();
        let task = db.get_task(&ctx, id).unwrap().unwrap();
        assert_eq!(task.name, "Check mail");
        assert_eq!(task.selected_days, vec![1, 3]);
        assert_eq!(task.repetition, Repetition::ByWeeks(4));
        assert_eq!(task.shift, Shift::Morning);
        assert_eq!(task.priority, Priority::UrgentNotImportant);
        assert_eq!(task.start_date(), Some(today()));
        assert!(!task.is_archived);
    }

    #[test]
    fn test_tasks_scoped_to_owner() {
        let (db, _dir) = setup_test_db();
        let ana = add_user(&db, "ana@example.com", Role::Normal);
        let bruno = add_user(&db, "bruno@example.com", Role::Normal);
        let id = db.create_task(&ana, &daily_task("Mine")).unwrap();

        assert!(db.get_task(&bruno, id).unwrap().is_none());
        assert!(db.list_tasks(&bruno, true).unwrap().is_empty());
        assert!(db.toggle_completion(&bruno, id, today()).is_err());
        assert!(!db.archive_task(&bruno, id).unwrap());
    }

    #[test]
    fn test_master_acts_for_user() {
        let (db, _dir) = setup_test_db();
        let master = add_user(&db, "boss@example.com", Role::Master);
        let ana = add_user(&db, "ana@example.com", Role::Normal);
        let ctx = ViewContext::viewing(master.actor().clone(), ana.actor().clone()).unwrap();

        let id = db.create_task(&ctx, &daily_task("Assigned")).unwrap();
        let task = db.get_task(&ana, id).unwrap().unwrap();
        assert_eq!(task.user_id, ana.subject_id());
    }

    #[test]
    fn test_toggle_completion_roundtrip() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let id = db.create_task(&ctx, &daily_task("Daily")).unwrap();
        let date = parse_date("2024-03-04").unwrap();

        assert!(db.toggle_completion(&ctx, id, date).unwrap());
        assert!(db.is_completed(&ctx, id, date).unwrap());
        assert_eq!(db.list_completions(&ctx, date, date).unwrap().len(), 1);

        assert!(!db.toggle_completion(&ctx, id, date).unwrap());
        assert!(!db.is_completed(&ctx, id, date).unwrap());
        assert!(db.list_completions(&ctx, date, date).unwrap().is_empty());
    }

    #[test]
    fn test_swap_order() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let a = db.create_task(&ctx, &daily_task("A")).unwrap();
        let b = db.create_task(&ctx, &daily_task("B")).unwrap();
        let ta = db.get_task(&ctx, a).unwrap().unwrap();
        let tb = db.get_task(&ctx, b).unwrap().unwrap();

        db.swap_order(&ctx, &ta, &tb).unwrap();
        let after_a = db.get_task(&ctx, a).unwrap().unwrap();
        let after_b = db.get_task(&ctx, b).unwrap().unwrap();
        assert_eq!(after_a.order_index, tb.order_index);
        assert_eq!(after_b.order_index, ta.order_index);
    }

    #[test]
    fn test_archive_hides_task() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let id = db.create_task(&ctx, &daily_task("Old")).unwrap();
        db.create_task(&ctx, &daily_task("New")).unwrap();

        assert!(db.archive_task(&ctx, id).unwrap());
        assert!(!db.archive_task(&ctx, id).unwrap());
        assert_eq!(db.list_tasks(&ctx, false).unwrap().len(), 1);
        assert_eq!(db.list_tasks(&ctx, true).unwrap().len(), 2);
        assert_eq!(db.archive_all(&ctx).unwrap(), 1);
        assert!(db.list_tasks(&ctx, false).unwrap().is_empty());
    }

    #[test]
    fn test_category_rename_moves_tasks() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let cat = db.create_category(&ctx, "General", "#FF0000").unwrap();
        let task = db.create_task(&ctx, &daily_task("Filed")).unwrap();

        assert!(db.update_category(&ctx, cat, Some("Ops"), None).unwrap());
        let category = db.get_category(&ctx, cat).unwrap().unwrap();
        assert_eq!(category.name, "Ops");
        assert_eq!(category.color, "#FF0000");
        assert_eq!(db.get_task(&ctx, task).unwrap().unwrap().category, "Ops");
    }

    #[test]
    fn test_duplicate_category_rejected() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        db.create_category(&ctx, "General", "#FF0000").unwrap();
        assert!(db.create_category(&ctx, "General", "#00FF00").is_err());
    }

    #[test]
    fn test_master_only_listing() {
        let (db, _dir) = setup_test_db();
        let ana = add_user(&db, "ana@example.com", Role::Normal);
        let date = today();
        assert!(db.list_all_tasks(&ana).is_err());
        assert!(db.list_all_completions(&ana, date, date).is_err());
    }

    #[test]
    fn test_malformed_rows_are_not_applicable() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let id = db.create_task(&ctx, &daily_task("Broken")).unwrap();
        db.conn
            .execute(
                "UPDATE tasks SET selected_days = 'oops', created_at = 'yesterday', is_daily = 0 WHERE id = ?1",
                [id],
            )
            .unwrap();
        db.conn
            .execute(
                "INSERT INTO daily_completions (task_id, user_id, completion_date) VALUES (?1, ?2, 'not-a-date')",
                params![id, ctx.subject_id()],
            )
            .unwrap();

        let task = db.get_task(&ctx, id).unwrap().unwrap();
        assert!(task.selected_days.is_empty());
        assert!(task.created_at.is_none());
        assert!(db.completions_of(ctx.subject_id(), None, None).unwrap().is_empty());
    }

    #[test]
    fn test_timer_persistence() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let now = Local::now();
        let mut sw = Stopwatch::start(
            TimerTarget::Task {
                id: 3,
                name: "Deep work".to_string(),
            },
            now.date_naive(),
            now,
        );
        sw.pause(now + chrono::Duration::seconds(42)).unwrap();
        db.save_timer(&ctx, &sw).unwrap();

        let loaded = db.load_timer(&ctx).unwrap().unwrap();
        assert_eq!(loaded.status, TimerStatus::Paused);
        assert_eq!(loaded.accumulated, 42);
        assert_eq!(loaded.target, sw.target);

        assert!(db.clear_timer(&ctx).unwrap());
        assert!(db.load_timer(&ctx).unwrap().is_none());
    }

    #[test]
    fn test_record_sessions() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let now = Local::now();
        let date = now.date_naive();
        let task_session = FinishedSession {
            target: TimerTarget::Task {
                id: 1,
                name: "Deep work".to_string(),
            },
            duration: 600,
            start_time: now,
            end_time: now + chrono::Duration::seconds(600),
            date,
        };
        let off = FinishedSession {
            target: TimerTarget::OffTask,
            ..task_session.clone()
        };
        db.record_session(&ctx, &task_session).unwrap();
        db.record_session(&ctx, &off).unwrap();

        let sessions = db.list_task_sessions(&ctx, date, date).unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].duration, 600);
        assert_eq!(db.list_off_task_sessions(&ctx, date, date).unwrap().len(), 1);
    }

    #[test]
    fn test_subscription_receives_snapshots() {
        let (db, _dir) = setup_test_db();
        let ctx = add_user(&db, "ana@example.com", Role::Normal);
        let seen: Rc<RefCell<Vec<usize>>> = Rc::new(RefCell::new(Vec::new()));
        let sink_seen = seen.clone();

        let sub = db
            .subscribe(Watch::Tasks { user_id: ctx.subject_id() }, move |snapshot| {
                if let Snapshot::Tasks(tasks) = snapshot {
                    sink_seen.borrow_mut().push(tasks.len());
                }
            })
            .unwrap();

        db.create_task(&ctx, &daily_task("One")).unwrap();
        db.create_task(&ctx, &daily_task("Two")).unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);

        drop(sub);
        db.create_task(&ctx, &daily_task("Three")).unwrap();
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn test_subscription_ignores_other_users() {
        let (db, _dir) = setup_test_db();
        let ana = add_user(&db, "ana@example.com", Role::Normal);
        let bruno = add_user(&db, "bruno@example.com", Role::Normal);
        let hits = Rc::new(RefCell::new(0));
        let sink_hits = hits.clone();
        let _sub = db
            .subscribe(Watch::Tasks { user_id: ana.subject_id() }, move |_| {
                *sink_hits.borrow_mut() += 1
            })
            .unwrap();

        db.create_task(&bruno, &daily_task("Not yours")).unwrap();
        assert_eq!(*hits.borrow(), 1);
    }
}
