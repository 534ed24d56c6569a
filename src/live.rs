//! A day board that stays current while the store changes underneath it.

use anyhow::Result;
use chrono::NaiveDate;
use std::cell::RefCell;
use std::rc::Rc;

use crate::aggregate::{split_day, CompletionLog, Productivity};
use crate::context::ViewContext;
use crate::db::Database;
use crate::feed::{Snapshot, Subscription, Watch};
use crate::models::{DailyCompletion, Task};
use crate::recurrence::DayFilter;

#[derive(Debug, Default)]
struct BoardState {
    tasks: Option<Vec<Task>>,
    completions: Option<Vec<DailyCompletion>>,
    updates: usize,
}

impl BoardState {
    fn apply(&mut self, snapshot: &Snapshot) {
        match snapshot {
            Snapshot::Tasks(tasks) => self.tasks = Some(tasks.clone()),
            Snapshot::Completions(completions) => self.completions = Some(completions.clone()),
            _ => return,
        }
        self.updates += 1;
    }
}

/// Tasks and completions of one user for one date, kept fresh by two
/// feed subscriptions. Either side may still be missing; it reads as empty.
pub struct DayBoard {
    date: NaiveDate,
    filter: DayFilter,
    state: Rc<RefCell<BoardState>>,
    _tasks: Subscription,
    _completions: Subscription,
}

impl DayBoard {
    pub fn open(
        db: &Database,
        ctx: &ViewContext,
        date: NaiveDate,
        filter: DayFilter,
    ) -> Result<Self> {
        let state = Rc::new(RefCell::new(BoardState::default()));
        let user_id = ctx.subject_id();

        let sink_state = state.clone();
        let tasks = db.subscribe(Watch::Tasks { user_id }, move |snapshot| {
            sink_state.borrow_mut().apply(snapshot)
        })?;
        let sink_state = state.clone();
        let completions = db.subscribe(
            Watch::Completions {
                user_id,
                date: Some(date),
            },
            move |snapshot| sink_state.borrow_mut().apply(snapshot),
        )?;

        Ok(DayBoard {
            date,
            filter,
            state,
            _tasks: tasks,
            _completions: completions,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Active tasks listed on this date, in list order.
    pub fn tasks(&self) -> Vec<Task> {
        let state = self.state.borrow();
        let tasks = state.tasks.as_deref().unwrap_or_default();
        tasks
            .iter()
            .filter(|t| !t.is_archived && self.filter.shows(t, self.date))
            .cloned()
            .collect()
    }

    pub fn filter(&self) -> DayFilter {
        self.filter
    }

    /// Whether task `id` is on this date's list.
    pub fn lists(&self, id: i64) -> bool {
        self.tasks().iter().any(|t| t.id == id)
    }

    pub fn log(&self) -> CompletionLog {
        let state = self.state.borrow();
        CompletionLog::from_records(state.completions.as_deref().unwrap_or_default())
    }

    pub fn summary(&self) -> Productivity {
        let tasks = self.tasks();
        split_day(&tasks, &self.log(), self.date, self.filter).summary()
    }

    /// Snapshots received so far, the two initial ones included.
    pub fn updates(&self) -> usize {
        self.state.borrow().updates
    }

    pub fn is_loaded(&self) -> bool {
        let state = self.state.borrow();
        state.tasks.is_some() && state.completions.is_some()
    }
}
