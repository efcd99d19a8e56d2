//! Persisted rotation state and its transition graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Schema version written into every state record.
pub const STATE_VERSION: u32 = 1;

/// Position of the tracked context in the rotation cycle.
///
/// Legal edges:
///
/// ```text
/// IDLE -> PENDING -> ARCHIVING -> ARCHIVED -> INJECTED -> COOLDOWN -> IDLE
///            |           |
///            v           v
///          IDLE       PENDING
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RotationPhase {
    #[default]
    Idle,
    Pending,
    Archiving,
    Archived,
    Injected,
    Cooldown,
}

impl RotationPhase {
    /// Returns all phases in cycle order.
    pub fn all() -> &'static [RotationPhase] {
        &[
            RotationPhase::Idle,
            RotationPhase::Pending,
            RotationPhase::Archiving,
            RotationPhase::Archived,
            RotationPhase::Injected,
            RotationPhase::Cooldown,
        ]
    }

    /// The phases reachable from `self` in one step.
    pub fn successors(self) -> &'static [RotationPhase] {
        match self {
            RotationPhase::Idle => &[RotationPhase::Pending],
            RotationPhase::Pending => &[RotationPhase::Archiving, RotationPhase::Idle],
            RotationPhase::Archiving => &[RotationPhase::Archived, RotationPhase::Pending],
            RotationPhase::Archived => &[RotationPhase::Injected],
            RotationPhase::Injected => &[RotationPhase::Cooldown],
            RotationPhase::Cooldown => &[RotationPhase::Idle],
        }
    }

    pub fn can_transition_to(self, next: RotationPhase) -> bool {
        self.successors().contains(&next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RotationPhase::Idle => "IDLE",
            RotationPhase::Pending => "PENDING",
            RotationPhase::Archiving => "ARCHIVING",
            RotationPhase::Archived => "ARCHIVED",
            RotationPhase::Injected => "INJECTED",
            RotationPhase::Cooldown => "COOLDOWN",
        }
    }
}

impl std::fmt::Display for RotationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One completed rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationRecord {
    pub timestamp: DateTime<Utc>,
    pub old_context_id: Option<String>,
    pub new_context_id: String,
    pub trigger_count: u64,
    pub injected_tokens: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
}

/// Durable record of rotation progress for one tracked context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    #[serde(default = "default_version")]
    pub version: u32,
    pub state: RotationPhase,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cooldown_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub old_context_id: Option<String>,
    #[serde(default)]
    pub old_context_file: Option<PathBuf>,
    #[serde(default)]
    pub archive_path: Option<PathBuf>,
    #[serde(default)]
    pub new_context_id: Option<String>,
    #[serde(default)]
    pub trigger_degradation_count: Option<u64>,
    #[serde(default)]
    pub injected_tokens: Option<usize>,
    #[serde(default)]
    pub cumulative_degradation_count: u64,
    #[serde(default)]
    pub rotation_history: Vec<RotationRecord>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_version() -> u32 {
    STATE_VERSION
}

impl Default for RotationState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            state: RotationPhase::Idle,
            started_at: None,
            cooldown_until: None,
            old_context_id: None,
            old_context_file: None,
            archive_path: None,
            new_context_id: None,
            trigger_degradation_count: None,
            injected_tokens: None,
            cumulative_degradation_count: 0,
            rotation_history: Vec::new(),
            error: None,
            updated_at: None,
        }
    }
}

impl RotationState {
    /// The most recently completed rotation, if any.
    pub fn last_rotation(&self) -> Option<&RotationRecord> {
        self.rotation_history.last()
    }

    /// Ordinal the next completed rotation will carry (1-based).
    pub fn next_ordinal(&self) -> usize {
        self.rotation_history.len() + 1
    }

    /// Whether the history already holds an entry for `new_context_id`.
    pub fn has_record_for(&self, new_context_id: &str) -> bool {
        self.rotation_history
            .iter()
            .any(|r| r.new_context_id == new_context_id)
    }

    /// Whether a completed rotation points at `archive_path`.
    pub fn archive_in_history(&self, archive_path: &Path) -> bool {
        self.rotation_history
            .iter()
            .any(|r| r.archive_path.as_deref() == Some(archive_path))
    }

    /// Reset the per-cycle fields, keeping the counter and history.
    pub fn clear_cycle(&mut self) {
        self.started_at = None;
        self.cooldown_until = None;
        self.old_context_id = None;
        self.old_context_file = None;
        self.archive_path = None;
        self.new_context_id = None;
        self.trigger_degradation_count = None;
        self.injected_tokens = None;
    }

    /// One-line status for display.
    pub fn status_summary(&self) -> String {
        format!(
            "{} (degradations: {}, rotations: {}{})",
            self.state,
            self.cumulative_degradation_count,
            self.rotation_history.len(),
            match &self.error {
                Some(err) => format!(", last error: {}", err),
                None => String::new(),
            }
        )
    }
}
