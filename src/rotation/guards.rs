//! Decides whether a rotation may start.
//!
//! Guards run in a fixed order, cheapest first; the active-work scan is the
//! only one that touches disk. Each check returns `Err(SkipReason)` to abstain.

use chrono::{DateTime, Duration, Utc};
use std::path::Path;

use super::state::{RotationPhase, RotationRecord, RotationState};
use super::transcript::{ACTIVE_WORK_SCAN_BYTES, outstanding_tool_calls, read_tail_lines};
use crate::config::RotationConfig;

/// Budget multiplier after one recent rotation.
pub const BACKOFF_ONE_RECENT: f64 = 0.67;
/// Budget multiplier after two or more recent rotations.
pub const BACKOFF_MANY_RECENT: f64 = 0.33;

/// Which cooldown floor is still in force.
#[derive(Debug, Clone, PartialEq)]
pub enum CooldownBlock {
    /// An explicit `cooldownUntil` timestamp lies in the future.
    Until(DateTime<Utc>),
    /// Not enough wall time since the last rotation.
    MinutesSinceLast { elapsed: i64, required: i64 },
    /// Not enough degradation events since the last rotation's trigger.
    CompactionsSinceLast { seen: u64, required: u64 },
}

/// Why a degradation event did not start a rotation.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Disabled,
    NotIdle(RotationPhase),
    BelowThreshold { count: u64, threshold: u64 },
    CircuitOpen { recent: usize, max: usize },
    Cooldown(CooldownBlock),
    ActiveWork { pending: Vec<String> },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Disabled => write!(f, "rotation disabled"),
            SkipReason::NotIdle(phase) => write!(f, "rotation state is {}", phase),
            SkipReason::BelowThreshold { count, threshold } => {
                write!(f, "degradation count {} below threshold {}", count, threshold)
            }
            SkipReason::CircuitOpen { recent, max } => write!(
                f,
                "circuit breaker open: {} rotations in window (max {})",
                recent, max
            ),
            SkipReason::Cooldown(CooldownBlock::Until(until)) => {
                write!(f, "cooling down until {}", until.to_rfc3339())
            }
            SkipReason::Cooldown(CooldownBlock::MinutesSinceLast { elapsed, required }) => write!(
                f,
                "cooling down: {} of {} minutes since last rotation",
                elapsed, required
            ),
            SkipReason::Cooldown(CooldownBlock::CompactionsSinceLast { seen, required }) => write!(
                f,
                "cooling down: {} of {} compactions since last rotation",
                seen, required
            ),
            SkipReason::ActiveWork { pending } => {
                write!(f, "{} tool call(s) still running", pending.len())
            }
        }
    }
}

pub fn check_enabled(config: &RotationConfig) -> Result<(), SkipReason> {
    if config.enabled {
        Ok(())
    } else {
        Err(SkipReason::Disabled)
    }
}

pub fn check_idle(state: &RotationState) -> Result<(), SkipReason> {
    match state.state {
        RotationPhase::Idle => Ok(()),
        other => Err(SkipReason::NotIdle(other)),
    }
}

pub fn check_threshold(config: &RotationConfig, state: &RotationState) -> Result<(), SkipReason> {
    let count = state.cumulative_degradation_count;
    if count >= config.threshold {
        Ok(())
    } else {
        Err(SkipReason::BelowThreshold {
            count,
            threshold: config.threshold,
        })
    }
}

/// Rotations whose timestamp falls inside the trailing breaker window.
pub fn recent_rotations(
    history: &[RotationRecord],
    window_minutes: i64,
    now: DateTime<Utc>,
) -> usize {
    let cutoff = Duration::try_minutes(window_minutes)
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    history.iter().filter(|r| r.timestamp >= cutoff).count()
}

pub fn check_circuit_breaker(
    config: &RotationConfig,
    state: &RotationState,
    now: DateTime<Utc>,
) -> Result<(), SkipReason> {
    let breaker = &config.circuit_breaker;
    let recent = recent_rotations(&state.rotation_history, breaker.window_minutes, now);
    if recent < breaker.max_rotations {
        Ok(())
    } else {
        Err(SkipReason::CircuitOpen {
            recent,
            max: breaker.max_rotations,
        })
    }
}

/// All cooldown floors must be clear.
pub fn check_cooldown(
    config: &RotationConfig,
    state: &RotationState,
    now: DateTime<Utc>,
) -> Result<(), SkipReason> {
    if let Some(until) = state.cooldown_until
        && until > now
    {
        return Err(SkipReason::Cooldown(CooldownBlock::Until(until)));
    }

    let Some(last) = state.last_rotation() else {
        return Ok(());
    };

    let elapsed = (now - last.timestamp).num_minutes();
    if elapsed < config.cooldown.min_minutes {
        return Err(SkipReason::Cooldown(CooldownBlock::MinutesSinceLast {
            elapsed,
            required: config.cooldown.min_minutes,
        }));
    }

    let seen = state
        .cumulative_degradation_count
        .saturating_sub(last.trigger_count);
    if seen < config.cooldown.min_compactions {
        return Err(SkipReason::Cooldown(CooldownBlock::CompactionsSinceLast {
            seen,
            required: config.cooldown.min_compactions,
        }));
    }

    Ok(())
}

/// Defer while the transcript tail shows a tool call without its result.
pub fn check_no_active_work(transcript: &Path) -> Result<(), SkipReason> {
    // An unreadable tail cannot prove work is running; the archive step
    // surfaces real I/O problems.
    let lines = read_tail_lines(transcript, ACTIVE_WORK_SCAN_BYTES).unwrap_or_default();
    let pending = outstanding_tool_calls(lines.iter().map(String::as_str));
    if pending.is_empty() {
        Ok(())
    } else {
        Err(SkipReason::ActiveWork { pending })
    }
}

/// Run every guard in order.
pub fn evaluate(
    config: &RotationConfig,
    state: &RotationState,
    transcript: &Path,
    now: DateTime<Utc>,
) -> Result<(), SkipReason> {
    check_enabled(config)?;
    check_idle(state)?;
    check_threshold(config, state)?;
    check_circuit_breaker(config, state, now)?;
    check_cooldown(config, state, now)?;
    check_no_active_work(transcript)
}

/// Budget multiplier for the given number of recent rotations.
pub fn backoff_multiplier(recent: usize) -> f64 {
    match recent {
        0 => 1.0,
        1 => BACKOFF_ONE_RECENT,
        _ => BACKOFF_MANY_RECENT,
    }
}
