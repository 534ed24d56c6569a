use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::aggregate::CompletionSource;
use crate::recurrence::DayFilter;

pub const WORKSPACE_DIR: &str = ".taskmap";
pub const DB_FILE: &str = "tasks.db";
pub const CONFIG_FILE: &str = "config.json";

/// Settings read from `.taskmap/config.json`. Missing keys use defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Email of the user commands act as when `--user` is not given.
    pub default_user: Option<String>,
    /// Where week and month reports read completion from.
    pub completion_source: CompletionSource,
    /// Hide a task from a day's listing on dates before it was created.
    pub hide_before_creation: bool,
    /// Only allow marking today's tasks, during their shift.
    pub enforce_shift: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            default_user: None,
            completion_source: CompletionSource::DateKeyed,
            hide_before_creation: false,
            enforce_shift: true,
        }
    }
}

impl Config {
    /// Narrowing applied to every listing of a day's tasks.
    pub fn day_filter(&self) -> DayFilter {
        DayFilter::hiding_before_creation(self.hide_before_creation)
    }

    pub fn load(workspace: &Path) -> Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn save(&self, workspace: &Path) -> Result<()> {
        let path = workspace.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Walk up from `start` looking for a `.taskmap` directory.
pub fn find_workspace(start: &Path) -> Result<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let candidate = current.join(WORKSPACE_DIR);
        if candidate.is_dir() {
            return Ok(candidate);
        }

        if !current.pop() {
            bail!("Not a taskmap workspace (or any parent). Run 'taskmap init' first.");
        }
    }
}
