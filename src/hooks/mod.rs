//! Host adapter for the rotation controller.
//!
//! Hosts drive rotor by piping one JSON document per notification into
//! `rotor hook`. The document is validated into a [`HostEvent`], dispatched
//! to the controller, and answered with a [`HookReply`] on stdout.
//!
//! # Host Events
//!
//! - `compaction` - The tracked context was compacted; carries the transcript path
//! - `startup` - The host restarted; resumes any interrupted rotation
//!
//! # Usage
//!
//! ```ignore
//! use rotor::hooks::{HostEvent, dispatch};
//!
//! let event = HostEvent::parse(&stdin)?;
//! let reply = dispatch(&mut controller, &event)?;
//! println!("{}", reply.to_json()?);
//! ```

pub mod types;

pub use types::{HookAction, HookReply, HostEvent};

use anyhow::Result;
use tracing::info;

use crate::rotation::RotationController;

/// Route a host event to the matching controller entry point.
pub fn dispatch(controller: &mut RotationController, event: &HostEvent) -> Result<HookReply> {
    match event.to_degradation_event()? {
        Some(degradation) => {
            info!(
                transcript = %degradation.transcript.display(),
                context = %degradation.context_id(),
                host_count = ?degradation.host_count,
                "compaction reported by host"
            );
            let outcome = controller.on_degradation_event(&degradation)?;
            Ok(HookReply::from(&outcome))
        }
        None => {
            let outcome = controller.on_startup()?;
            Ok(HookReply::from(&outcome))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RotationConfig;
    use crate::rotation::{FileSink, MemorySource, RotationPhase, StateStore};

    fn controller(dir: &std::path::Path) -> RotationController {
        RotationController::new(
            RotationConfig::default(),
            StateStore::new(&dir.join("state"), "main"),
            MemorySource::new(dir),
            dir.join("archive"),
            Box::new(FileSink::new(dir.join("inject"))),
        )
    }

    #[test]
    fn test_dispatch_compaction_and_startup() {
        let dir = tempfile::tempdir().unwrap();
        let transcript = dir.path().join("abc.jsonl");
        std::fs::write(
            &transcript,
            "{\"role\":\"user\",\"content\":\"hi\"}\n{\"role\":\"assistant\",\"content\":\"hello\"}\n",
        )
        .unwrap();
        let mut ctl = controller(dir.path());

        let event = HostEvent::parse(&format!(
            r#"{{"event":"compaction","transcriptPath":"{}","sessionId":"abc"}}"#,
            transcript.display()
        ))
        .unwrap();

        assert_eq!(dispatch(&mut ctl, &event).unwrap().action, HookAction::Skipped);
        assert_eq!(dispatch(&mut ctl, &event).unwrap().action, HookAction::Skipped);
        let reply = dispatch(&mut ctl, &event).unwrap();
        assert_eq!(reply.action, HookAction::Rotated);

        let new_id = reply.new_context_id.unwrap();
        assert!(dir.path().join("inject").join(format!("{}.md", new_id)).exists());
        assert!(dir.path().join("archive").join("abc.jsonl").exists());

        let reply = dispatch(&mut ctl, &HostEvent::Startup).unwrap();
        assert_eq!(reply.action, HookAction::CoolingDown);
        assert_eq!(ctl.state().unwrap().state, RotationPhase::Cooldown);
    }

    #[test]
    fn test_dispatch_rejects_compaction_without_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctl = controller(dir.path());
        let event = HostEvent::Compaction {
            transcript_path: None,
            session_id: None,
            compaction_count: Some(1),
        };
        assert!(dispatch(&mut ctl, &event).is_err());
        assert_eq!(ctl.state().unwrap().cumulative_degradation_count, 0);
    }
}
