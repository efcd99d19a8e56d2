//! Durable memory artifacts read by path convention.
//!
//! ```text
//! <workspace>/MEMORY.md              long-term memory (memory.md also accepted)
//! <workspace>/memory/YYYY-MM-DD.md   daily logs
//! ```
//!
//! A missing or unreadable artifact is empty content, never an error.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

const LONG_TERM_FILES: &[&str] = &["MEMORY.md", "memory.md"];
const DAILY_DIR: &str = "memory";

/// Read-only view of an agent workspace's memory files.
#[derive(Debug, Clone)]
pub struct MemorySource {
    workspace: PathBuf,
}

impl MemorySource {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Long-term memory text, trimmed.
    pub fn long_term(&self) -> String {
        LONG_TERM_FILES
            .iter()
            .map(|name| self.workspace.join(name))
            .find(|p| p.is_file())
            .map(|p| read_or_empty(&p))
            .unwrap_or_default()
    }

    /// Path of the daily log for `date`.
    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.workspace
            .join(DAILY_DIR)
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    /// Daily log text for `date`, trimmed.
    pub fn daily(&self, date: NaiveDate) -> String {
        read_or_empty(&self.daily_path(date))
    }
}

fn read_or_empty(path: &Path) -> String {
    match std::fs::read_to_string(path) {
        Ok(content) => content.trim().to_string(),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "memory artifact unavailable");
            String::new()
        }
    }
}
