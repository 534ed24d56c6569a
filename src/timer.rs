//! Start / pause / finalize stopwatch behind task and off-task sessions.

use anyhow::{bail, Result};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Running,
    Paused,
}

impl TimerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerStatus::Running => "running",
            TimerStatus::Paused => "paused",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => TimerStatus::Running,
            _ => TimerStatus::Paused,
        }
    }
}

/// What the time is being spent on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimerTarget {
    Task { id: i64, name: String },
    OffTask,
}

/// A stopwatch that has been started and not yet finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stopwatch {
    pub target: TimerTarget,
    pub status: TimerStatus,
    /// When the first segment started.
    pub started_at: DateTime<Local>,
    /// Start of the current segment while running.
    pub running_since: Option<DateTime<Local>>,
    /// Seconds banked by earlier segments.
    pub accumulated: i64,
    /// Calendar day the session is recorded against.
    pub date: NaiveDate,
}

/// A finished session ready to be appended to the log.
#[derive(Debug, Clone, PartialEq)]
pub struct FinishedSession {
    pub target: TimerTarget,
    pub duration: i64,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    pub date: NaiveDate,
}

impl Stopwatch {
    pub fn start(target: TimerTarget, date: NaiveDate, now: DateTime<Local>) -> Self {
        Stopwatch {
            target,
            status: TimerStatus::Running,
            started_at: now,
            running_since: Some(now),
            accumulated: 0,
            date,
        }
    }

    pub fn elapsed(&self, now: DateTime<Local>) -> i64 {
        let current = match (self.status, self.running_since) {
            (TimerStatus::Running, Some(since)) => now.signed_duration_since(since).num_seconds().max(0),
            _ => 0,
        };
        self.accumulated + current
    }

    pub fn pause(&mut self, now: DateTime<Local>) -> Result<()> {
        if self.status != TimerStatus::Running {
            bail!("Timer is already paused");
        }
        self.accumulated = self.elapsed(now);
        self.running_since = None;
        self.status = TimerStatus::Paused;
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Local>) -> Result<()> {
        if self.status != TimerStatus::Paused {
            bail!("Timer is already running");
        }
        self.running_since = Some(now);
        self.status = TimerStatus::Running;
        Ok(())
    }

    /// Stop for good. Returns `None` when no time was recorded, in which case
    /// nothing should be logged.
    pub fn finalize(self, now: DateTime<Local>) -> Option<FinishedSession> {
        let duration = self.elapsed(now);
        if duration <= 0 {
            return None;
        }
        Some(FinishedSession {
            target: self.target,
            duration,
            start_time: self.started_at,
            end_time: now,
            date: self.date,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Local> {
        Local::now()
    }

    fn task_target() -> TimerTarget {
        TimerTarget::Task {
            id: 7,
            name: "Report".to_string(),
        }
    }

    #[test]
    fn test_running_elapsed() {
        let now = t0();
        let sw = Stopwatch::start(task_target(), now.date_naive(), now);
        assert_eq!(sw.elapsed(now + Duration::seconds(90)), 90);
    }

    #[test]
    fn test_pause_banks_time() {
        let now = t0();
        let mut sw = Stopwatch::start(task_target(), now.date_naive(), now);
        sw.pause(now + Duration::seconds(30)).unwrap();
        assert_eq!(sw.elapsed(now + Duration::seconds(500)), 30);
        assert!(sw.pause(now + Duration::seconds(40)).is_err());
    }

    #[test]
    fn test_resume_accumulates() {
        let now = t0();
        let mut sw = Stopwatch::start(task_target(), now.date_naive(), now);
        sw.pause(now + Duration::seconds(30)).unwrap();
        sw.resume(now + Duration::seconds(100)).unwrap();
        assert_eq!(sw.elapsed(now + Duration::seconds(110)), 40);
        assert!(sw.resume(now + Duration::seconds(120)).is_err());
    }

    #[test]
    fn test_finalize_keeps_first_start() {
        let now = t0();
        let mut sw = Stopwatch::start(TimerTarget::OffTask, now.date_naive(), now);
        sw.pause(now + Duration::seconds(10)).unwrap();
        sw.resume(now + Duration::seconds(20)).unwrap();
        let end = now + Duration::seconds(25);
        let session = sw.finalize(end).unwrap();
        assert_eq!(session.duration, 15);
        assert_eq!(session.start_time, now);
        assert_eq!(session.end_time, end);
        assert_eq!(session.target, TimerTarget::OffTask);
    }

    #[test]
    fn test_finalize_zero_is_none() {
        let now = t0();
        let sw = Stopwatch::start(task_target(), now.date_naive(), now);
        assert!(sw.finalize(now).is_none());
    }
}
