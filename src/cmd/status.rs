//! Rotation status: `rotor status`.

use anyhow::{Context, Result};

use rotor::rotation::{RotationPhase, archive::ARCHIVE_EXTENSION};

use super::RotorEnv;

/// Number of history entries shown.
const HISTORY_ROWS: usize = 5;

pub fn cmd_status(env: &RotorEnv, json: bool) -> Result<()> {
    let store = env.store();
    let state = store.read()?;

    if json {
        let out = serde_json::to_string_pretty(&state).context("Failed to serialize state")?;
        println!("{}", out);
        return Ok(());
    }

    let config = env.load_config()?;
    let phase = match state.state {
        RotationPhase::Idle => console::style(state.state.as_str()).green(),
        RotationPhase::Cooldown => console::style(state.state.as_str()).cyan(),
        _ => console::style(state.state.as_str()).yellow(),
    };

    println!();
    println!("{}", console::style("Context Rotation Status").bold().cyan());
    println!("=======================");
    println!();
    println!("Tracked context: {}", env.context);
    println!("State file:      {}", store.path().display());
    println!("State:           {}", phase);
    println!(
        "Degradations:    {} (threshold {})",
        state.cumulative_degradation_count, config.threshold
    );
    if !config.enabled {
        println!("Rotation:        {}", console::style("disabled").dim());
    }
    if let Some(until) = state.cooldown_until {
        println!("Cooldown until:  {}", until.to_rfc3339());
    }
    if let Some(old) = &state.old_context_id {
        println!("Rotating:        {}", old);
    }
    if let Some(err) = &state.error {
        println!("{} {}", console::style("Last error:     ").red().bold(), err);
    }
    println!("Archives:        {}", count_archives(env));
    println!();

    if state.rotation_history.is_empty() {
        println!("No rotations yet.");
    } else {
        println!(
            "{:<4} {:<26} {:<8} {:<8} New context",
            "#", "When", "Trigger", "Tokens"
        );
        println!(
            "{:<4} {:<26} {:<8} {:<8} -----------",
            "--", "--------------------------", "-------", "------"
        );
        let skip = state.rotation_history.len().saturating_sub(HISTORY_ROWS);
        for (i, record) in state.rotation_history.iter().enumerate().skip(skip) {
            println!(
                "{:<4} {:<26} {:<8} {:<8} {}",
                i + 1,
                record.timestamp.to_rfc3339(),
                record.trigger_count,
                record.injected_tokens,
                record.new_context_id
            );
        }
    }
    println!();
    Ok(())
}

fn count_archives(env: &RotorEnv) -> usize {
    std::fs::read_dir(env.archive_dir())
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION))
                .count()
        })
        .unwrap_or(0)
}
