use anyhow::{bail, Result};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Normal,
    Master,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Normal => "normal",
            Role::Master => "master",
        }
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "normal" => Ok(Role::Normal),
            "master" => Ok(Role::Master),
            other => bail!("Invalid role '{}'. Must be one of: normal, master", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub sector: String,
    pub position: String,
    pub created_at: Option<DateTime<Local>>,
}

impl User {
    pub fn is_master(&self) -> bool {
        self.role == Role::Master
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub color: String,
    pub created_at: Option<DateTime<Local>>,
}

pub const DEFAULT_CATEGORY_COLOR: &str = "#D1D5DB";

/// How long a recurring task keeps repeating after it is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "repeat_type", content = "num_weeks", rename_all = "snake_case")]
pub enum Repetition {
    Continuous,
    ByWeeks(u32),
}

impl Repetition {
    pub fn repeat_type(&self) -> &'static str {
        match self {
            Repetition::Continuous => "continuous",
            Repetition::ByWeeks(_) => "by_weeks",
        }
    }

    pub fn num_weeks(&self) -> Option<u32> {
        match self {
            Repetition::Continuous => None,
            Repetition::ByWeeks(n) => Some(*n),
        }
    }

    /// Rebuild from the stored pair. `limited_weeks` is an older spelling of
    /// `by_weeks`; a week-limited policy without a usable count repeats forever.
    pub fn from_parts(repeat_type: &str, num_weeks: Option<i64>) -> Self {
        match (repeat_type, num_weeks) {
            ("by_weeks" | "limited_weeks", Some(n)) if n > 0 => {
                Repetition::ByWeeks(u32::try_from(n).unwrap_or(u32::MAX))
            }
            _ => Repetition::Continuous,
        }
    }
}

/// Time-of-day window in which a task may be marked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    Any,
    Morning,
    Afternoon,
    Evening,
}

impl Shift {
    pub const ALL: [Shift; 4] = [Shift::Any, Shift::Morning, Shift::Afternoon, Shift::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            Shift::Any => "any",
            Shift::Morning => "morning",
            Shift::Afternoon => "afternoon",
            Shift::Evening => "evening",
        }
    }

    /// Shift covering a given hour of the day (0-23).
    pub fn at_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Shift::Morning,
            12..=17 => Shift::Afternoon,
            18..=23 => Shift::Evening,
            _ => Shift::Any,
        }
    }

    pub fn allows(&self, current: Shift) -> bool {
        *self == Shift::Any || *self == current
    }
}

impl FromStr for Shift {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Shift::ALL
            .into_iter()
            .find(|shift| shift.as_str() == s)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid shift '{}'. Must be one of: any, morning, afternoon, evening",
                    s
                )
            })
    }
}

/// Eisenhower matrix quadrant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    ImportantUrgent,
    ImportantNotUrgent,
    UrgentNotImportant,
    NotUrgentNotImportant,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::ImportantUrgent,
        Priority::ImportantNotUrgent,
        Priority::UrgentNotImportant,
        Priority::NotUrgentNotImportant,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::ImportantUrgent => "important-urgent",
            Priority::ImportantNotUrgent => "important-not-urgent",
            Priority::UrgentNotImportant => "urgent-not-important",
            Priority::NotUrgentNotImportant => "not-urgent-not-important",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Priority::ImportantUrgent => "Important and urgent",
            Priority::ImportantNotUrgent => "Important, not urgent",
            Priority::UrgentNotImportant => "Urgent, not important",
            Priority::NotUrgentNotImportant => "Neither urgent nor important",
        }
    }
}

impl FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Priority::ALL.iter().map(|p| p.as_str()).collect();
                anyhow::anyhow!("Invalid priority '{}'. Must be one of: {}", s, valid.join(", "))
            })
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub category: String,
    pub is_daily: bool,
    /// Weekdays encoded 0=Sunday..6=Saturday. Ignored when `is_daily`.
    pub selected_days: Vec<u8>,
    pub repetition: Repetition,
    pub shift: Shift,
    pub priority: Priority,
    /// Legacy per-task completion flag, see `aggregate::CompletionSource`.
    pub completed: bool,
    pub created_at: Option<DateTime<Local>>,
    pub order_index: i64,
    pub is_archived: bool,
}

impl Task {
    /// Calendar day the task was created on, the start of its repetition window.
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.created_at.map(|dt| dt.date_naive())
    }
}

/// Fields supplied when creating a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub category: String,
    pub is_daily: bool,
    pub selected_days: Vec<u8>,
    pub repetition: Repetition,
    pub shift: Shift,
    pub priority: Priority,
}

impl NewTask {
    /// Check creation invariants and normalise the weekday set.
    pub fn validated(mut self) -> Result<Self> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            bail!("Task name cannot be empty");
        }
        if let Some(bad) = self.selected_days.iter().find(|d| **d > 6) {
            bail!("Invalid weekday {}. Use 0 (Sunday) through 6 (Saturday)", bad);
        }
        if self.is_daily {
            self.selected_days.clear();
        } else if self.selected_days.is_empty() {
            bail!("Select at least one weekday for a task that is not daily");
        }
        self.selected_days.sort_unstable();
        self.selected_days.dedup();
        if let Repetition::ByWeeks(0) = self.repetition {
            bail!("Week count must be at least 1");
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyCompletion {
    pub task_id: i64,
    pub user_id: i64,
    pub completion_date: NaiveDate,
    pub completion_timestamp: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSession {
    pub id: i64,
    pub user_id: i64,
    pub task_id: i64,
    pub task_name: String,
    pub duration: i64,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub completion_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OffTaskSession {
    pub id: i64,
    pub user_id: i64,
    pub duration: i64,
    pub start_time: Option<DateTime<Local>>,
    pub end_time: Option<DateTime<Local>>,
    pub completion_date: NaiveDate,
}
