//! The rotation state machine and its two entry points.
//!
//! [`RotationController::on_degradation_event`] runs a whole cycle
//! (IDLE → PENDING → ARCHIVING → ARCHIVED → INJECTED → COOLDOWN) inside one
//! call when the guards allow it. [`RotationController::on_startup`] resumes a
//! cycle interrupted by a restart. Every step commits its state before the
//! next side effect, so a restart always lands on a state the recovery table
//! knows how to finish.

use chrono::{DateTime, Duration, Local, Utc};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::archive;
use super::guards::{self, SkipReason};
use super::memory::MemorySource;
use super::payload::{PayloadAssembler, RotationMetadata, budget_for};
use super::sink::{Injection, InjectionSink};
use super::state::{RotationPhase, RotationRecord, RotationState};
use super::store::StateStore;
use crate::config::{MAX_MINUTES, RotationConfig};
use crate::errors::{Result, RotationError};

/// Source of the current time.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A compaction of the tracked context, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradationEvent {
    /// Durable transcript of the tracked context.
    pub transcript: PathBuf,
    /// Host identifier of the context; derived from the transcript name when absent.
    pub context_id: Option<String>,
    /// Host-side compaction counter, if the host exposes one. Informational;
    /// the controller counts events itself.
    pub host_count: Option<u64>,
}

impl DegradationEvent {
    pub fn new(transcript: impl Into<PathBuf>) -> Self {
        Self {
            transcript: transcript.into(),
            context_id: None,
            host_count: None,
        }
    }

    pub fn with_context_id(mut self, id: impl Into<String>) -> Self {
        self.context_id = Some(id.into());
        self
    }

    /// Identifier of the context being tracked.
    pub fn context_id(&self) -> String {
        self.context_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| {
                self.transcript
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
            })
            .unwrap_or_else(|| "context".to_string())
    }
}

/// A completed rotation.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationSummary {
    pub ordinal: usize,
    pub old_context_id: Option<String>,
    pub new_context_id: String,
    pub archive_path: Option<PathBuf>,
    pub trigger_count: u64,
    pub injected_tokens: usize,
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl RotationSummary {
    fn from_state(state: &RotationState) -> Option<Self> {
        let record = state.last_rotation()?;
        Some(Self {
            ordinal: state.rotation_history.len(),
            old_context_id: record.old_context_id.clone(),
            new_context_id: record.new_context_id.clone(),
            archive_path: record.archive_path.clone(),
            trigger_count: record.trigger_count,
            injected_tokens: record.injected_tokens,
            cooldown_until: state.cooldown_until,
        })
    }
}

/// Result of a degradation event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Rotated(RotationSummary),
    Skipped(SkipReason),
    CooldownExpired,
    /// Archiving failed; the cycle was rolled back to IDLE and will be
    /// retried on a later event.
    ArchiveRolledBack { reason: String },
}

/// Result of startup recovery.
#[derive(Debug, Clone, PartialEq)]
pub enum StartupOutcome {
    Idle,
    /// A cycle that never reached a destructive step was abandoned.
    Reverted,
    ArchiveRolledBack { reason: String },
    Rotated(RotationSummary),
    CooldownExpired,
    CoolingDown { until: Option<DateTime<Utc>> },
}

/// Drives rotation for one tracked context.
pub struct RotationController {
    config: RotationConfig,
    store: StateStore,
    memory: MemorySource,
    archive_dir: PathBuf,
    sink: Box<dyn InjectionSink>,
    clock: Box<dyn Clock>,
}

impl RotationController {
    pub fn new(
        config: RotationConfig,
        store: StateStore,
        memory: MemorySource,
        archive_dir: PathBuf,
        sink: Box<dyn InjectionSink>,
    ) -> Self {
        Self {
            config,
            store,
            memory,
            archive_dir,
            sink,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Current persisted state.
    pub fn state(&self) -> Result<RotationState> {
        self.store.read()
    }

    /// Handle one degradation event.
    pub fn on_degradation_event(&mut self, event: &DegradationEvent) -> Result<EventOutcome> {
        let now = self.clock.now();
        let current = self.store.read()?;
        let state = self
            .store
            .patch(&current, |s| s.cumulative_degradation_count += 1)?;
        debug!(
            count = state.cumulative_degradation_count,
            host_count = ?event.host_count,
            state = %state.state,
            "degradation event recorded"
        );

        if state.state == RotationPhase::Cooldown && cooldown_expired(&state, now) {
            self.store
                .write(&state, RotationPhase::Idle, RotationState::clear_cycle)?;
            info!("rotation cooldown expired");
            return Ok(EventOutcome::CooldownExpired);
        }

        if let Err(reason) = guards::evaluate(&self.config, &state, &event.transcript, now) {
            match skip_warning(&reason) {
                Some(message) => warn!(
                    %reason,
                    error = state.error.as_deref().unwrap_or("none"),
                    "{}",
                    message
                ),
                None => debug!(%reason, "rotation skipped"),
            }
            return Ok(EventOutcome::Skipped(reason));
        }

        self.rotate(state, event, now)
    }

    /// Resume whatever cycle a restart interrupted.
    pub fn on_startup(&mut self) -> Result<StartupOutcome> {
        let now = self.clock.now();
        let state = self.store.read()?;
        debug!(state = %state.state, "startup recovery");

        match state.state {
            RotationPhase::Idle => Ok(StartupOutcome::Idle),
            RotationPhase::Pending => {
                self.store
                    .write(&state, RotationPhase::Idle, RotationState::clear_cycle)?;
                info!("abandoned pending rotation after restart");
                Ok(StartupOutcome::Reverted)
            }
            RotationPhase::Archiving => {
                let valid = match (&state.archive_path, &state.old_context_file) {
                    (Some(archive_path), Some(original)) => archive::validate(archive_path, original),
                    _ => false,
                };
                if valid {
                    let archived = self.store.write(&state, RotationPhase::Archived, |_| {})?;
                    info!("archive verified after restart; resuming injection");
                    Ok(StartupOutcome::Rotated(self.inject(archived)?))
                } else {
                    let reason = "archive incomplete after restart".to_string();
                    self.roll_back(&state, &reason)?;
                    Ok(StartupOutcome::ArchiveRolledBack { reason })
                }
            }
            RotationPhase::Archived => {
                info!("resuming injection after restart");
                Ok(StartupOutcome::Rotated(self.inject(state)?))
            }
            RotationPhase::Injected => {
                info!("finalizing injected rotation after restart");
                Ok(StartupOutcome::Rotated(self.finalize(state)?))
            }
            RotationPhase::Cooldown => {
                if cooldown_expired(&state, now) {
                    self.store
                        .write(&state, RotationPhase::Idle, RotationState::clear_cycle)?;
                    Ok(StartupOutcome::CooldownExpired)
                } else {
                    Ok(StartupOutcome::CoolingDown {
                        until: state.cooldown_until,
                    })
                }
            }
        }
    }

    fn rotate(
        &mut self,
        state: RotationState,
        event: &DegradationEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        let trigger = state.cumulative_degradation_count;
        let old_id = event.context_id();
        let archive_path =
            archive::archive_path_for(&self.archive_dir, &old_id, state.next_ordinal());

        let pending = self.store.write(&state, RotationPhase::Pending, |s| {
            s.started_at = Some(now);
            s.old_context_id = Some(old_id.clone());
            s.old_context_file = Some(event.transcript.clone());
            s.trigger_degradation_count = Some(trigger);
            s.error = None;
        })?;
        info!(context = %old_id, trigger, "rotation started");

        let archiving = self.store.write(&pending, RotationPhase::Archiving, |s| {
            s.archive_path = Some(archive_path.clone());
        })?;

        let failure = if archiving.archive_in_history(&archive_path) {
            Some(format!(
                "archive {} already belongs to an earlier rotation",
                archive_path.display()
            ))
        } else {
            match archive::archive(&event.transcript, &archive_path) {
                Err(e) => Some(e.to_string()),
                Ok(_) if !archive::validate(&archive_path, &event.transcript) => {
                    Some(format!("archive {} failed validation", archive_path.display()))
                }
                Ok(_) => None,
            }
        };
        if let Some(reason) = failure {
            self.roll_back(&archiving, &reason)?;
            return Ok(EventOutcome::ArchiveRolledBack { reason });
        }

        let archived = self.store.write(&archiving, RotationPhase::Archived, |_| {})?;
        Ok(EventOutcome::Rotated(self.inject(archived)?))
    }

    /// ARCHIVING → PENDING → IDLE, deleting the partial archive. An archive
    /// that a completed rotation points at is left alone.
    fn roll_back(&self, state: &RotationState, reason: &str) -> Result<RotationState> {
        match &state.archive_path {
            Some(path) if state.archive_in_history(path) => {
                warn!(path = %path.display(), "archive belongs to an earlier rotation; not deleting");
            }
            Some(path) => {
                if let Err(e) = archive::discard(path) {
                    warn!(path = %path.display(), error = %e, "failed to delete partial archive");
                }
            }
            None => {}
        }
        warn!(reason, "archive failed; rotation rolled back");

        let pending = self.store.write(state, RotationPhase::Pending, |s| {
            s.archive_path = None;
            s.error = Some(reason.to_string());
        })?;
        self.store
            .write(&pending, RotationPhase::Idle, RotationState::clear_cycle)
    }

    /// ARCHIVED → INJECTED → COOLDOWN. Each attempt mints a fresh context id.
    fn inject(&mut self, state: RotationState) -> Result<RotationSummary> {
        let now = self.clock.now();
        let recent = guards::recent_rotations(
            &state.rotation_history,
            self.config.circuit_breaker.window_minutes,
            now,
        );
        let backoff = guards::backoff_multiplier(recent);
        let trigger = state
            .trigger_degradation_count
            .unwrap_or(state.cumulative_degradation_count);

        let metadata = RotationMetadata {
            ordinal: state.next_ordinal(),
            reason: format!(
                "degradation count {} reached threshold {}",
                trigger, self.config.threshold
            ),
            previous_context_id: state.old_context_id.clone(),
            archive_path: state.archive_path.clone(),
            trigger_count: trigger,
        };
        let source = state
            .archive_path
            .clone()
            .or_else(|| state.old_context_file.clone())
            .unwrap_or_default();
        let today = now.with_timezone(&Local).date_naive();
        let payload = PayloadAssembler::new(&self.config, &self.memory)
            .assemble(&source, metadata, backoff, today);

        let new_id = Uuid::new_v4().to_string();
        let injection = Injection {
            new_context_id: new_id.clone(),
            old_context_id: state.old_context_id.clone(),
            archive_path: state.archive_path.clone(),
            estimated_tokens: payload.estimated_tokens,
            over_budget: payload.over_budget,
            notify: self.config.notify,
            created_at: now,
            document: payload.render(),
        };
        if let Err(source) = self.sink.deliver(&injection) {
            let message = format!("injection delivery failed: {:#}", source);
            self.store.patch(&state, |s| s.error = Some(message))?;
            return Err(RotationError::Delivery {
                context_id: new_id,
                source,
            });
        }

        let injected = self.store.write(&state, RotationPhase::Injected, |s| {
            s.new_context_id = Some(new_id.clone());
            s.injected_tokens = Some(payload.estimated_tokens);
        })?;
        info!(
            new_context = %new_id,
            tokens = payload.estimated_tokens,
            budget = budget_for(&self.config, backoff),
            backoff,
            steps = payload.steps_applied.len(),
            "injection delivered"
        );

        self.finalize(injected)
    }

    /// INJECTED → COOLDOWN, appending the history entry once.
    fn finalize(&self, state: RotationState) -> Result<RotationSummary> {
        let now = self.clock.now();
        let new_id = state.new_context_id.clone().ok_or_else(|| {
            RotationError::Other(anyhow::anyhow!("INJECTED state has no new context id"))
        })?;

        let record = RotationRecord {
            timestamp: now,
            old_context_id: state.old_context_id.clone(),
            new_context_id: new_id.clone(),
            trigger_count: state
                .trigger_degradation_count
                .unwrap_or(state.cumulative_degradation_count),
            injected_tokens: state.injected_tokens.unwrap_or(0),
            archive_path: state.archive_path.clone(),
        };
        let already_recorded = state.has_record_for(&new_id);
        let minutes = self.config.cooldown.min_minutes.clamp(0, MAX_MINUTES);
        let until = now
            .checked_add_signed(Duration::minutes(minutes))
            .unwrap_or(now);

        let cooled = self.store.write(&state, RotationPhase::Cooldown, |s| {
            if !already_recorded {
                s.rotation_history.push(record);
            }
            s.cooldown_until = Some(until);
            s.error = None;
        })?;

        if let Some(current) = &cooled.archive_path {
            let removed = archive::prune(&self.archive_dir, self.config.archive.retain, current);
            if !removed.is_empty() {
                info!(count = removed.len(), "pruned old archives");
            }
        }

        info!(
            new_context = %new_id,
            rotations = cooled.rotation_history.len(),
            cooldown_until = %until.to_rfc3339(),
            "rotation complete"
        );

        RotationSummary::from_state(&cooled).ok_or_else(|| {
            RotationError::Other(anyhow::anyhow!("rotation history empty after finalize"))
        })
    }
}

fn cooldown_expired(state: &RotationState, now: DateTime<Utc>) -> bool {
    state.cooldown_until.is_none_or(|until| until <= now)
}

/// Skips an operator should see. Everything else is routine and logs at debug.
fn skip_warning(reason: &SkipReason) -> Option<&'static str> {
    match reason {
        SkipReason::CircuitOpen { .. } => {
            Some("automatic rotation suppressed; context may be oscillating")
        }
        SkipReason::NotIdle(RotationPhase::Archived) => {
            Some("rotation skipped; injection is pending until the next startup")
        }
        _ => None,
    }
}
