//! Typed error hierarchy for the rotation controller.
//!
//! `RotationError` covers everything the core can return. Policy outcomes
//! (threshold not met, cooldown active, breaker tripped, active work) are not
//! errors; see [`crate::rotation::SkipReason`].

use std::path::PathBuf;
use thiserror::Error;

use crate::rotation::RotationPhase;

/// Errors from the rotation core.
#[derive(Debug, Error)]
pub enum RotationError {
    /// A transition outside the legal graph was requested. This is a logic
    /// defect in the controller or recovery table and is never handled.
    #[error("Illegal rotation transition {from} -> {to}")]
    IllegalTransition {
        from: RotationPhase,
        to: RotationPhase,
    },

    #[error("Failed to read rotation state at {path}: {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rotation state at {path}: {source}")]
    StateParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write rotation state at {path}: {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to archive {from} to {to}: {source}")]
    ArchiveCopy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Injection delivery for context {context_id} failed: {source}")]
    Delivery {
        context_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = RotationError> = std::result::Result<T, E>;
