//! Personal productivity map: recurring tasks, per-day completions, shift
//! windows, stopwatch sessions and day/week/month completion reports, stored
//! in a local SQLite workspace.

pub mod aggregate;
pub mod commands;
pub mod config;
pub mod context;
pub mod dates;
pub mod db;
pub mod feed;
pub mod live;
pub mod models;
pub mod recurrence;
pub mod timer;
