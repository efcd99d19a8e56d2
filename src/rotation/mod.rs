//! Context Rotation
//!
//! Watches a long-lived agent context for compaction events and, once the
//! context has been compacted often enough, replaces it with a fresh one
//! seeded from workspace memory and the tail of the old conversation.
//!
//! ## Cycle
//!
//! Every step is committed to the state file before the next side effect:
//!
//! 1. **PENDING**: guards passed, cycle started
//! 2. **ARCHIVING**: transcript copy in progress
//! 3. **ARCHIVED**: byte-identical archive validated
//! 4. **INJECTED**: payload delivered to the host
//! 5. **COOLDOWN**: history recorded, further rotations suppressed
//!
//! A restart in the middle of a cycle is resolved by
//! [`RotationController::on_startup`].
//!
//! ## Configuration
//!
//! Rotation is configured in `rotor.toml`:
//!
//! ```toml
//! threshold = 3
//! injection_budget = 0.15
//!
//! [cooldown]
//! min_compactions = 2
//! min_minutes = 30
//!
//! [circuit_breaker]
//! max_rotations = 3
//! window_minutes = 60
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use rotor::rotation::{DegradationEvent, FileSink, MemorySource, RotationController, StateStore};
//!
//! let mut controller = RotationController::new(
//!     config,
//!     StateStore::new(&state_dir, "main"),
//!     MemorySource::new(&workspace),
//!     state_dir.join("archive"),
//!     Box::new(FileSink::new(state_dir.join("inject"))),
//! );
//! controller.on_startup()?;
//! controller.on_degradation_event(&DegradationEvent::new(transcript))?;
//! ```

pub mod archive;
mod controller;
mod estimate;
pub mod guards;
mod memory;
pub mod payload;
mod sink;
mod state;
mod store;
pub mod transcript;

pub use controller::{
    Clock, DegradationEvent, EventOutcome, RotationController, RotationSummary, StartupOutcome,
    SystemClock,
};
pub use estimate::{CHARS_PER_TOKEN, estimate_tokens};
pub use guards::{CooldownBlock, SkipReason};
pub use memory::MemorySource;
pub use payload::{InjectionPayload, PayloadAssembler, RotationMetadata, TruncationStep};
pub use sink::{FileSink, Injection, InjectionSink};
pub use state::{RotationPhase, RotationRecord, RotationState, STATE_VERSION};
pub use store::StateStore;

/// Directory under the state dir holding transcript archives.
pub const ARCHIVE_DIR_NAME: &str = "archive";

/// Directory under the state dir the file sink writes payloads to.
pub const INJECT_DIR_NAME: &str = "inject";

/// Directory under the state dir for rolling log files.
pub const LOG_DIR_NAME: &str = "logs";

/// Tracked context used when none is given.
pub const DEFAULT_CONTEXT: &str = "main";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_constants() {
        let dirs = [ARCHIVE_DIR_NAME, INJECT_DIR_NAME, LOG_DIR_NAME];
        for (i, a) in dirs.iter().enumerate() {
            assert!(!a.is_empty());
            assert!(dirs[i + 1..].iter().all(|b| a != b));
        }
        assert!(!DEFAULT_CONTEXT.is_empty());
        assert_eq!(RotationState::default().version, STATE_VERSION);
    }
}
