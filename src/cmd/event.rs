//! Manual degradation event: `rotor event <transcript>`.

use anyhow::Result;
use std::path::Path;

use rotor::rotation::{DegradationEvent, EventOutcome};

use super::RotorEnv;

pub fn cmd_event(
    env: &RotorEnv,
    transcript: &Path,
    session_id: Option<&str>,
    count: Option<u64>,
) -> Result<()> {
    let mut event = DegradationEvent::new(transcript);
    if let Some(id) = session_id {
        event = event.with_context_id(id);
    }
    event.host_count = count;

    let mut controller = env.controller()?;
    match controller.on_degradation_event(&event)? {
        EventOutcome::Rotated(summary) => {
            println!(
                "{} rotation #{} -> {}",
                console::style("Rotated:").green().bold(),
                summary.ordinal,
                summary.new_context_id
            );
            if let Some(archive) = &summary.archive_path {
                println!("  archive: {}", archive.display());
            }
            println!("  injected tokens: {}", summary.injected_tokens);
            println!(
                "  payload: {}",
                env.inject_dir()
                    .join(format!("{}.md", summary.new_context_id))
                    .display()
            );
        }
        EventOutcome::Skipped(reason) => {
            println!("{} {}", console::style("Skipped:").dim(), reason);
        }
        EventOutcome::CooldownExpired => {
            println!("{}", console::style("Cooldown expired; rotation re-armed.").cyan());
        }
        EventOutcome::ArchiveRolledBack { reason } => {
            println!("{} {}", console::style("Archive failed:").red().bold(), reason);
        }
    }
    Ok(())
}
