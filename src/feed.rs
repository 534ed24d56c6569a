//! Change notifications: subscribe with a query, receive a fresh snapshot
//! after every matching write, unsubscribe by dropping the handle.

use chrono::NaiveDate;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::models::{Category, DailyCompletion, Task, TaskSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Categories,
    Tasks,
    DailyCompletions,
    TaskSessions,
    OffTaskSessions,
}

/// What a subscriber is listening to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watch {
    Categories { user_id: i64 },
    Tasks { user_id: i64 },
    Completions { user_id: i64, date: Option<NaiveDate> },
    TaskSessions { user_id: i64, date: Option<NaiveDate> },
}

impl Watch {
    pub fn collection(&self) -> Collection {
        match self {
            Watch::Categories { .. } => Collection::Categories,
            Watch::Tasks { .. } => Collection::Tasks,
            Watch::Completions { .. } => Collection::DailyCompletions,
            Watch::TaskSessions { .. } => Collection::TaskSessions,
        }
    }

    pub fn user_id(&self) -> i64 {
        match self {
            Watch::Categories { user_id }
            | Watch::Tasks { user_id }
            | Watch::Completions { user_id, .. }
            | Watch::TaskSessions { user_id, .. } => *user_id,
        }
    }

    pub fn matches(&self, change: &Change) -> bool {
        self.collection() == change.collection && self.user_id() == change.user_id
    }
}

/// A write that landed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Change {
    pub collection: Collection,
    pub user_id: i64,
}

#[derive(Debug, Clone)]
pub enum Snapshot {
    Categories(Vec<Category>),
    Tasks(Vec<Task>),
    Completions(Vec<DailyCompletion>),
    TaskSessions(Vec<TaskSession>),
}

pub type Sink = Box<dyn FnMut(&Snapshot)>;

struct Entry {
    id: u64,
    watch: Watch,
    sink: Sink,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
    /// Entry whose sink is running, taken out of `entries` meanwhile.
    delivering: Option<u64>,
    /// Set when that entry's subscription is dropped from inside its sink.
    cancelled: bool,
}

/// Subscriber registry owned by the store.
///
/// Sinks run synchronously inside the write that triggered them and must
/// not write back to the store.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    registry: Rc<RefCell<Registry>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, watch: Watch, sink: Sink) -> Subscription {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = registry.next_id;
        registry.entries.push(Entry { id, watch, sink });
        Subscription {
            id,
            registry: Rc::downgrade(&self.registry),
        }
    }

    /// Watches interested in `change`, with their subscription ids.
    pub fn interested(&self, change: &Change) -> Vec<(u64, Watch)> {
        self.registry
            .borrow()
            .entries
            .iter()
            .filter(|e| e.watch.matches(change))
            .map(|e| (e.id, e.watch))
            .collect()
    }

    /// Hand a snapshot to one subscriber. Unknown ids are ignored, since the
    /// subscriber may have gone away in the meantime.
    ///
    /// The registry is not borrowed while the sink runs, so a sink may drop
    /// its own subscription.
    pub fn deliver(&self, id: u64, snapshot: &Snapshot) {
        let (pos, mut entry) = {
            let mut registry = self.registry.borrow_mut();
            let Some(pos) = registry.entries.iter().position(|e| e.id == id) else {
                return;
            };
            registry.delivering = Some(id);
            registry.cancelled = false;
            (pos, registry.entries.remove(pos))
        };

        (entry.sink)(snapshot);

        let mut registry = self.registry.borrow_mut();
        registry.delivering = None;
        if std::mem::take(&mut registry.cancelled) {
            // The sink may own other subscriptions; drop it unborrowed.
            drop(registry);
            drop(entry);
        } else {
            let pos = pos.min(registry.entries.len());
            registry.entries.insert(pos, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.registry.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Live subscription handle. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    registry: Weak<RefCell<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.borrow_mut();
            if registry.delivering == Some(self.id) {
                registry.cancelled = true;
            } else {
                registry.entries.retain(|e| e.id != self.id);
            }
        }
    }
}
