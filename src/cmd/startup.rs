//! Startup recovery: `rotor startup`.

use anyhow::Result;

use rotor::rotation::StartupOutcome;

use super::RotorEnv;

pub fn cmd_startup(env: &RotorEnv) -> Result<()> {
    let mut controller = env.controller()?;
    match controller.on_startup()? {
        StartupOutcome::Idle => println!("Nothing to recover."),
        StartupOutcome::Reverted => println!("Abandoned an unstarted rotation."),
        StartupOutcome::ArchiveRolledBack { reason } => {
            println!("{} {}", console::style("Rolled back:").yellow(), reason)
        }
        StartupOutcome::Rotated(summary) => println!(
            "{} rotation #{} -> {}",
            console::style("Resumed:").green().bold(),
            summary.ordinal,
            summary.new_context_id
        ),
        StartupOutcome::CooldownExpired => println!("Cooldown expired; rotation re-armed."),
        StartupOutcome::CoolingDown { until } => match until {
            Some(until) => println!("Cooling down until {}.", until.to_rfc3339()),
            None => println!("Cooling down."),
        },
    }
    Ok(())
}
