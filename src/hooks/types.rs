//! Host event and reply types for the rotor hook.
//!
//! - `HostEvent`: the JSON document a host writes to `rotor hook` on stdin
//! - `HookAction`: what the controller did in response
//! - `HookReply`: the JSON document written back on stdout

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::rotation::{DegradationEvent, EventOutcome, StartupOutcome};

/// A notification from the agent host.
///
/// ```json
/// {"event": "compaction", "transcriptPath": "/s/abc.jsonl", "sessionId": "abc", "compactionCount": 4}
/// {"event": "startup"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostEvent {
    /// The host compacted the tracked context.
    Compaction {
        #[serde(default, alias = "transcript_path")]
        transcript_path: Option<PathBuf>,
        #[serde(default, alias = "session_id")]
        session_id: Option<String>,
        #[serde(default, alias = "compaction_count")]
        compaction_count: Option<u64>,
    },
    /// The host process (re)started.
    Startup,
}

impl HostEvent {
    /// Parse a host event from JSON.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            anyhow::bail!("Empty hook input; expected a JSON host event");
        }
        serde_json::from_str(trimmed).context("Failed to parse host event JSON")
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostEvent::Compaction { .. } => "compaction",
            HostEvent::Startup => "startup",
        }
    }

    /// Validate a compaction event into the controller's input.
    ///
    /// Returns `None` for non-compaction events.
    pub fn to_degradation_event(&self) -> Result<Option<DegradationEvent>> {
        let HostEvent::Compaction {
            transcript_path,
            session_id,
            compaction_count,
        } = self
        else {
            return Ok(None);
        };

        let transcript = transcript_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty())
            .context("Compaction event is missing 'transcriptPath'")?;

        Ok(Some(DegradationEvent {
            transcript: transcript.clone(),
            context_id: session_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            host_count: *compaction_count,
        }))
    }
}

impl std::fmt::Display for HostEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the controller did with a host event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookAction {
    /// Nothing to do.
    None,
    Rotated,
    Skipped,
    CooldownExpired,
    CoolingDown,
    /// Archiving failed and the cycle was rolled back.
    RolledBack,
    /// An interrupted cycle was abandoned on startup.
    Reverted,
}

impl HookAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookAction::None => "none",
            HookAction::Rotated => "rotated",
            HookAction::Skipped => "skipped",
            HookAction::CooldownExpired => "cooldown_expired",
            HookAction::CoolingDown => "cooling_down",
            HookAction::RolledBack => "rolled_back",
            HookAction::Reverted => "reverted",
        }
    }
}

impl std::fmt::Display for HookAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reply written to stdout for the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookReply {
    pub action: HookAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Context the host should switch to, when a rotation completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_context_id: Option<String>,
}

impl HookReply {
    fn new(action: HookAction, message: Option<String>) -> Self {
        Self {
            action,
            message,
            new_context_id: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize hook reply")
    }
}

impl From<&EventOutcome> for HookReply {
    fn from(outcome: &EventOutcome) -> Self {
        match outcome {
            EventOutcome::Rotated(summary) => HookReply {
                action: HookAction::Rotated,
                message: Some(format!("rotation #{} complete", summary.ordinal)),
                new_context_id: Some(summary.new_context_id.clone()),
            },
            EventOutcome::Skipped(reason) => {
                HookReply::new(HookAction::Skipped, Some(reason.to_string()))
            }
            EventOutcome::CooldownExpired => HookReply::new(HookAction::CooldownExpired, None),
            EventOutcome::ArchiveRolledBack { reason } => {
                HookReply::new(HookAction::RolledBack, Some(reason.clone()))
            }
        }
    }
}

impl From<&StartupOutcome> for HookReply {
    fn from(outcome: &StartupOutcome) -> Self {
        match outcome {
            StartupOutcome::Idle => HookReply::new(HookAction::None, None),
            StartupOutcome::Reverted => HookReply::new(HookAction::Reverted, None),
            StartupOutcome::ArchiveRolledBack { reason } => {
                HookReply::new(HookAction::RolledBack, Some(reason.clone()))
            }
            StartupOutcome::Rotated(summary) => HookReply {
                action: HookAction::Rotated,
                message: Some(format!("rotation #{} resumed and completed", summary.ordinal)),
                new_context_id: Some(summary.new_context_id.clone()),
            },
            StartupOutcome::CooldownExpired => HookReply::new(HookAction::CooldownExpired, None),
            StartupOutcome::CoolingDown { until } => HookReply::new(
                HookAction::CoolingDown,
                until.map(|u| format!("cooling down until {}", u.to_rfc3339())),
            ),
        }
    }
}
