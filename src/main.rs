use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

mod cmd;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "ROTOR_LOG";

#[derive(Parser)]
#[command(name = "rotor")]
#[command(version, about = "Context rotation controller for long-lived agent sessions")]
pub struct Cli {
    /// Log at debug level unless ROTOR_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Directory for rotation state, archives, payloads and logs (default: ~/.rotor)
    #[arg(long, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Agent workspace holding MEMORY.md and memory/ (default: current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Path to rotor.toml (default: <state-dir>/rotor.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Handle of the tracked context
    #[arg(long, default_value = rotor::rotation::DEFAULT_CONTEXT, global = true)]
    pub context: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Handle one JSON host event read from stdin
    Hook,
    /// Report a compaction of the tracked context
    Event {
        /// Transcript (JSONL) of the compacted context
        transcript: PathBuf,
        /// Host identifier of the context (defaults to the transcript name)
        #[arg(long)]
        session_id: Option<String>,
        /// Host-side compaction counter, logged only
        #[arg(long)]
        count: Option<u64>,
    },
    /// Resume or roll back a rotation interrupted by a restart
    Startup,
    /// Show rotation state and history
    Status {
        /// Print the raw state record as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(log_dir: &Path, verbose: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "rotor.log"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(fmt::layer().json().with_writer(file_writer))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = cmd::RotorEnv::from_cli(&cli)?;
    let _log_guard = init_logging(&env.log_dir(), cli.verbose)?;

    match &cli.command {
        Commands::Hook => cmd::cmd_hook(&env)?,
        Commands::Event {
            transcript,
            session_id,
            count,
        } => cmd::cmd_event(&env, transcript, session_id.as_deref(), *count)?,
        Commands::Startup => cmd::cmd_startup(&env)?,
        Commands::Status { json } => cmd::cmd_status(&env, *json)?,
    }

    Ok(())
}
