//! Integration tests for rotor
//!
//! These tests drive the binary end to end against a temporary state dir
//! and workspace.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a rotor Command pointed at `dir`.
fn rotor(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("rotor");
    cmd.arg("--state-dir")
        .arg(dir.path().join("state"))
        .arg("--workspace")
        .arg(dir.path().join("ws"))
        .env("ROTOR_LOG", "warn");
    cmd
}

/// Helper to create a workspace with memory files and a transcript.
fn create_workspace() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let ws = dir.path().join("ws");
    fs::create_dir_all(ws.join("memory")).unwrap();
    fs::write(ws.join("MEMORY.md"), "# Memory\n\nPrefers short answers.\n").unwrap();

    let transcript = ws.join("sess-42.jsonl");
    fs::write(
        &transcript,
        [
            r#"{"role":"user","content":"What is the deploy plan?"}"#,
            r#"{"role":"assistant","content":[{"type":"text","text":"Blue/green on Friday."}]}"#,
        ]
        .join("\n")
            + "\n",
    )
    .unwrap();
    (dir, transcript)
}

fn read_state(dir: &TempDir) -> serde_json::Value {
    let raw = fs::read_to_string(dir.path().join("state").join("main.rotation.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn send_event(dir: &TempDir, transcript: &Path) -> assert_cmd::assert::Assert {
    rotor(dir).arg("event").arg(transcript).assert()
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_rotor_help() {
        cargo_bin_cmd!("rotor")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("hook"))
            .stdout(predicate::str::contains("startup"));
    }

    #[test]
    fn test_rotor_version() {
        cargo_bin_cmd!("rotor").arg("--version").assert().success();
    }

    #[test]
    fn test_startup_on_empty_state_dir() {
        let (dir, _) = create_workspace();
        rotor(&dir)
            .arg("startup")
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to recover"));
        assert!(dir.path().join("state").join("logs").exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let (dir, transcript) = create_workspace();
        fs::create_dir_all(dir.path().join("state")).unwrap();
        fs::write(dir.path().join("state").join("rotor.toml"), "threshold = 0\n").unwrap();

        send_event(&dir, &transcript)
            .failure()
            .stderr(predicate::str::contains("threshold must be at least 1"));
    }
}

// =============================================================================
// Rotation Tests
// =============================================================================

mod rotation {
    use super::*;

    #[test]
    fn test_third_event_rotates() {
        let (dir, transcript) = create_workspace();

        for _ in 0..2 {
            send_event(&dir, &transcript)
                .success()
                .stdout(predicate::str::contains("below threshold"));
        }
        send_event(&dir, &transcript)
            .success()
            .stdout(predicate::str::contains("Rotated: rotation #1"));

        let state = read_state(&dir);
        assert_eq!(state["state"], "COOLDOWN");
        assert_eq!(state["cumulativeDegradationCount"], 3);
        assert_eq!(state["rotationHistory"].as_array().unwrap().len(), 1);

        let archive = dir.path().join("state").join("archive").join("sess-42-1.jsonl");
        assert_eq!(fs::read(&archive).unwrap(), fs::read(&transcript).unwrap());

        let new_id = state["newContextId"].as_str().unwrap();
        let doc_path = dir.path().join("state").join("inject").join(format!("{}.md", new_id));
        let doc = fs::read_to_string(doc_path).unwrap();
        assert!(doc.contains("Prefers short answers."));
        assert!(doc.contains("**User:** What is the deploy plan?"));
        assert!(doc.contains("**Assistant:** Blue/green on Friday."));

        let manifest_path = dir.path().join("state").join("inject").join(format!("{}.json", new_id));
        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
        assert_eq!(manifest["oldContextId"], "sess-42");
    }

    #[test]
    fn test_event_during_cooldown_is_skipped() {
        let (dir, transcript) = create_workspace();
        for _ in 0..3 {
            send_event(&dir, &transcript).success();
        }
        send_event(&dir, &transcript)
            .success()
            .stdout(predicate::str::contains("rotation state is COOLDOWN"));
        assert_eq!(read_state(&dir)["cumulativeDegradationCount"], 4);
    }

    #[test]
    fn test_active_work_defers() {
        let (dir, transcript) = create_workspace();
        fs::create_dir_all(dir.path().join("state")).unwrap();
        fs::write(dir.path().join("state").join("rotor.toml"), "threshold = 1\n").unwrap();
        fs::write(
            &transcript,
            r#"{"role":"assistant","content":[{"type":"tool_use","id":"toolu_9","name":"bash"}]}"#,
        )
        .unwrap();

        send_event(&dir, &transcript)
            .success()
            .stdout(predicate::str::contains("tool call(s) still running"));
        assert_eq!(read_state(&dir)["state"], "IDLE");
        assert!(!dir.path().join("state").join("archive").exists());
    }
}

// =============================================================================
// Hook and Status Tests
// =============================================================================

mod hook_and_status {
    use super::*;

    fn hook_input(transcript: &Path) -> String {
        serde_json::json!({
            "event": "compaction",
            "transcriptPath": transcript,
            "sessionId": "sess-42",
            "compactionCount": 7
        })
        .to_string()
    }

    #[test]
    fn test_hook_replies_with_json() {
        let (dir, transcript) = create_workspace();

        rotor(&dir)
            .arg("hook")
            .write_stdin(hook_input(&transcript))
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""action":"skipped""#));

        rotor(&dir)
            .arg("hook")
            .write_stdin(hook_input(&transcript))
            .assert()
            .success();

        rotor(&dir)
            .arg("hook")
            .write_stdin(hook_input(&transcript))
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""action":"rotated""#))
            .stdout(predicate::str::contains("newContextId"));

        rotor(&dir)
            .arg("hook")
            .write_stdin(r#"{"event":"startup"}"#)
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""action":"cooling_down""#));
    }

    #[test]
    fn test_hook_rejects_malformed_input() {
        let (dir, _) = create_workspace();
        rotor(&dir)
            .arg("hook")
            .write_stdin("{\"event\":\"compaction\"}")
            .assert()
            .failure()
            .stderr(predicate::str::contains("transcriptPath"));

        rotor(&dir)
            .arg("hook")
            .write_stdin("garbage")
            .assert()
            .failure();
    }

    #[test]
    fn test_status_before_and_after_rotation() {
        let (dir, transcript) = create_workspace();
        rotor(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("IDLE"))
            .stdout(predicate::str::contains("No rotations yet."));

        for _ in 0..3 {
            send_event(&dir, &transcript).success();
        }

        rotor(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("COOLDOWN"))
            .stdout(predicate::str::contains("Archives:        1"));

        rotor(&dir)
            .args(["status", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""state": "COOLDOWN""#));
    }

    #[test]
    fn test_contexts_are_tracked_separately() {
        let (dir, transcript) = create_workspace();
        for _ in 0..3 {
            rotor(&dir)
                .args(["--context", "side"])
                .arg("event")
                .arg(&transcript)
                .assert()
                .success();
        }
        assert!(dir.path().join("state").join("side.rotation.json").exists());
        assert!(!dir.path().join("state").join("main.rotation.json").exists());
    }
}
