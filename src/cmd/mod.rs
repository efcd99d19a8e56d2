//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module    | Commands handled |
//! |-----------|------------------|
//! | `hook`    | `Hook`           |
//! | `event`   | `Event`          |
//! | `startup` | `Startup`        |
//! | `status`  | `Status`         |

pub mod event;
pub mod hook;
pub mod startup;
pub mod status;

pub use event::cmd_event;
pub use hook::cmd_hook;
pub use startup::cmd_startup;
pub use status::cmd_status;

use anyhow::{Context, Result};
use std::path::PathBuf;

use rotor::config::{CONFIG_FILE_NAME, RotationConfig};
use rotor::rotation::{
    ARCHIVE_DIR_NAME, FileSink, INJECT_DIR_NAME, LOG_DIR_NAME, MemorySource, RotationController,
    StateStore,
};

use super::Cli;

/// Paths resolved from the global flags.
#[derive(Debug, Clone)]
pub struct RotorEnv {
    pub state_dir: PathBuf,
    pub workspace: PathBuf,
    pub config_path: PathBuf,
    pub context: String,
}

impl RotorEnv {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let state_dir = match &cli.state_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .context("Failed to locate home directory; pass --state-dir")?
                .join(".rotor"),
        };
        let workspace = match &cli.workspace {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().context("Failed to get current directory")?,
        };
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| state_dir.join(CONFIG_FILE_NAME));

        Ok(Self {
            state_dir,
            workspace,
            config_path,
            context: cli.context.clone(),
        })
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.state_dir.join(ARCHIVE_DIR_NAME)
    }

    pub fn inject_dir(&self) -> PathBuf {
        self.state_dir.join(INJECT_DIR_NAME)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.state_dir.join(LOG_DIR_NAME)
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(&self.state_dir, &self.context)
    }

    /// Load `rotor.toml`, refusing an invalid configuration.
    pub fn load_config(&self) -> Result<RotationConfig> {
        let config = RotationConfig::load_or_default(&self.config_path)?;
        let problems = config.validate();
        if !problems.is_empty() {
            anyhow::bail!(
                "Invalid configuration in {}:\n  - {}",
                self.config_path.display(),
                problems.join("\n  - ")
            );
        }
        Ok(config)
    }

    /// Controller wired to the file sink under the state dir.
    pub fn controller(&self) -> Result<RotationController> {
        Ok(RotationController::new(
            self.load_config()?,
            self.store(),
            MemorySource::new(&self.workspace),
            self.archive_dir(),
            Box::new(FileSink::new(self.inject_dir())),
        ))
    }
}
