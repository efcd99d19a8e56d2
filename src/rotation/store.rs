//! Durable, atomically committed rotation state.
//!
//! Every commit serializes to a hidden temp file beside the target, syncs it,
//! then renames it over the state file. A reader sees either the previous
//! complete record or the new one.

use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::state::{RotationPhase, RotationState};
use crate::errors::{Result, RotationError};

/// State record for a single tracked context.
#[derive(Debug, Clone)]
pub struct StateStore {
    state_file: PathBuf,
}

impl StateStore {
    /// Store for `tracked_context` under `state_dir`.
    ///
    /// The handle is sanitized into a file name, so any host session key can
    /// be used directly.
    pub fn new(state_dir: &Path, tracked_context: &str) -> Self {
        let file_name = format!("{}.rotation.json", sanitize_handle(tracked_context));
        Self {
            state_file: state_dir.join(file_name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.state_file
    }

    /// Last committed state, or a fresh IDLE state if nothing was written yet.
    pub fn read(&self) -> Result<RotationState> {
        let content = match fs::read_to_string(&self.state_file) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RotationState::default());
            }
            Err(source) => {
                return Err(RotationError::StateRead {
                    path: self.state_file.clone(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| RotationError::StateParse {
            path: self.state_file.clone(),
            source,
        })
    }

    /// Transition `current` to `next`, applying `update` to the new record.
    ///
    /// Fails with [`RotationError::IllegalTransition`] if `next` is not a
    /// successor of `current.state`; nothing is written in that case.
    pub fn write<F>(
        &self,
        current: &RotationState,
        next: RotationPhase,
        update: F,
    ) -> Result<RotationState>
    where
        F: FnOnce(&mut RotationState),
    {
        let from = current.state;
        if !from.can_transition_to(next) {
            return Err(RotationError::IllegalTransition { from, to: next });
        }

        let mut updated = current.clone();
        update(&mut updated);
        updated.state = next;
        updated.updated_at = Some(Utc::now());
        self.commit(&updated)?;

        debug!(from = %from, to = %next, file = %self.state_file.display(), "rotation state committed");
        Ok(updated)
    }

    /// Update bookkeeping fields without a transition.
    ///
    /// An update that tries to change `state` is rejected as an illegal
    /// transition.
    pub fn patch<F>(&self, current: &RotationState, update: F) -> Result<RotationState>
    where
        F: FnOnce(&mut RotationState),
    {
        let mut updated = current.clone();
        update(&mut updated);
        if updated.state != current.state {
            return Err(RotationError::IllegalTransition {
                from: current.state,
                to: updated.state,
            });
        }
        updated.updated_at = Some(Utc::now());
        self.commit(&updated)?;
        Ok(updated)
    }

    fn commit(&self, state: &RotationState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| RotationError::Other(anyhow::Error::new(e)))?;
        atomic_write(&self.state_file, json.as_bytes()).map_err(|source| {
            RotationError::StateWrite {
                path: self.state_file.clone(),
                source,
            }
        })
    }
}

/// Write `bytes` to `path` via temp file, fsync and rename.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let tmp_path = dir.join(format!(".{}.tmp", file_name));

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    // Persist the rename itself where the platform allows opening directories.
    if let Ok(dir_handle) = File::open(dir) {
        let _ = dir_handle.sync_all();
    }
    Ok(())
}

/// Reduce a host-supplied handle to a safe file-name component.
pub(crate) fn sanitize_handle(handle: &str) -> String {
    let cleaned: String = handle
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (StateStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (StateStore::new(dir.path(), "main"), dir)
    }

    #[test]
    fn test_read_missing_is_idle() {
        let (store, _dir) = make_store();
        let state = store.read().unwrap();
        assert_eq!(state.state, RotationPhase::Idle);
        assert_eq!(state.cumulative_degradation_count, 0);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_write_roundtrip_and_stamp() {
        let (store, _dir) = make_store();
        let idle = store.read().unwrap();
        let pending = store
            .write(&idle, RotationPhase::Pending, |s| {
                s.old_context_id = Some("ctx-1".into());
                s.trigger_degradation_count = Some(3);
            })
            .unwrap();

        assert_eq!(pending.state, RotationPhase::Pending);
        assert!(pending.updated_at.is_some());

        let reread = store.read().unwrap();
        assert_eq!(reread, pending);
    }

    #[test]
    fn test_write_rejects_illegal_edge() {
        let (store, _dir) = make_store();
        let idle = store.read().unwrap();
        let err = store
            .write(&idle, RotationPhase::Injected, |_| {})
            .unwrap_err();
        assert!(matches!(
            err,
            RotationError::IllegalTransition {
                from: RotationPhase::Idle,
                to: RotationPhase::Injected
            }
        ));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_update_cannot_smuggle_state() {
        let (store, _dir) = make_store();
        let idle = store.read().unwrap();
        let pending = store
            .write(&idle, RotationPhase::Pending, |s| s.state = RotationPhase::Cooldown)
            .unwrap();
        assert_eq!(pending.state, RotationPhase::Pending);
    }

    #[test]
    fn test_patch_updates_counter_without_transition() {
        let (store, _dir) = make_store();
        let idle = store.read().unwrap();
        let patched = store
            .patch(&idle, |s| s.cumulative_degradation_count += 1)
            .unwrap();
        assert_eq!(patched.state, RotationPhase::Idle);
        assert_eq!(store.read().unwrap().cumulative_degradation_count, 1);
    }

    #[test]
    fn test_patch_rejects_state_change() {
        let (store, _dir) = make_store();
        let idle = store.read().unwrap();
        let err = store
            .patch(&idle, |s| s.state = RotationPhase::Archived)
            .unwrap_err();
        assert!(matches!(err, RotationError::IllegalTransition { .. }));
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let (store, dir) = make_store();
        let idle = store.read().unwrap();
        store.patch(&idle, |s| s.cumulative_degradation_count = 9).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["main.rotation.json".to_string()]);
    }

    #[test]
    fn test_stale_temp_file_does_not_affect_read() {
        let (store, dir) = make_store();
        let idle = store.read().unwrap();
        store.patch(&idle, |s| s.cumulative_degradation_count = 2).unwrap();

        // Simulate a crash after a partial temp write.
        fs::write(dir.path().join(".main.rotation.json.tmp"), "{\"state\":").unwrap();
        assert_eq!(store.read().unwrap().cumulative_degradation_count, 2);

        // The next commit replaces the stale temp file.
        let current = store.read().unwrap();
        store.patch(&current, |s| s.cumulative_degradation_count = 3).unwrap();
        assert_eq!(store.read().unwrap().cumulative_degradation_count, 3);
    }

    #[test]
    fn test_corrupt_state_is_parse_error() {
        let (store, _dir) = make_store();
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(
            store.read().unwrap_err(),
            RotationError::StateParse { .. }
        ));
    }

    #[test]
    fn test_handle_is_sanitized() {
        let dir = tempdir().unwrap();
        let store = StateStore::new(dir.path(), "agent:main/session 1");
        assert_eq!(
            store.path().file_name().unwrap().to_string_lossy(),
            "agent_main_session_1.rotation.json"
        );
        let store = StateStore::new(dir.path(), "..");
        assert_eq!(
            store.path().file_name().unwrap().to_string_lossy(),
            "default.rotation.json"
        );
    }

    #[test]
    fn test_recovery_after_restart() {
        let dir = tempdir().unwrap();
        {
            let store = StateStore::new(dir.path(), "main");
            let idle = store.read().unwrap();
            let pending = store.write(&idle, RotationPhase::Pending, |_| {}).unwrap();
            store
                .write(&pending, RotationPhase::Archiving, |s| {
                    s.archive_path = Some(PathBuf::from("/archive/ctx.jsonl"));
                })
                .unwrap();
        }

        let store = StateStore::new(dir.path(), "main");
        let state = store.read().unwrap();
        assert_eq!(state.state, RotationPhase::Archiving);
        assert_eq!(state.archive_path, Some(PathBuf::from("/archive/ctx.jsonl")));
    }
}
