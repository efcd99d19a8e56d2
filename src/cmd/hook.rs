//! Host hook entry point: `rotor hook`.

use anyhow::{Context, Result};
use std::io::Read;
use tracing::info;

use rotor::hooks::{HostEvent, dispatch};

use super::RotorEnv;

/// Read one host event from stdin and print the JSON reply on stdout.
pub fn cmd_hook(env: &RotorEnv) -> Result<()> {
    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Failed to read hook input from stdin")?;

    let event = HostEvent::parse(&input)?;
    let mut controller = env.controller()?;
    let reply = dispatch(&mut controller, &event)
        .with_context(|| format!("Failed to handle '{}' event", event))?;

    info!(action = %reply.action, state = %controller.state()?.status_summary(), "hook handled");
    println!("{}", reply.to_json()?);
    Ok(())
}
