use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use phasekeeper::subsystem::Subsystem;

mod cmd;

#[derive(Parser)]
#[command(name = "phasekeeper")]
#[command(version, about = "Track pipeline phase status and per-phase quality signals")]
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable logging
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Config file (defaults to <project-dir>/phasekeeper.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set a phase's status; on `done`, record its signals in the intel log
    Update(UpdateArgs),
    /// Show phases and the current phase of a state file
    Status {
        /// Path to a state file, e.g. state/backend_state.mdc
        state_file: PathBuf,
    },
    /// List intel log entries
    Intel {
        /// Only show entries for this subsystem
        #[arg(long)]
        subsystem: Option<Subsystem>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
        /// Intel log location (overrides config)
        #[arg(long)]
        intel_path: Option<PathBuf>,
    },
    /// View, validate or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct UpdateArgs {
    /// Path to a state file, e.g. state/backend_state.mdc
    pub state_file: PathBuf,

    /// Phase identifier, e.g. backend_phase_1
    pub phase_id: String,

    /// Phase status (not_started|in_progress|done|blocked)
    pub status: String,

    /// Set this phase as current_phase in the state file
    #[arg(long)]
    pub make_current: bool,

    /// Record tests_passed = true for this phase
    #[arg(long, conflicts_with = "tests_failed")]
    pub tests_passed: bool,

    /// Record tests_passed = false for this phase
    #[arg(long)]
    pub tests_failed: bool,

    /// Warning count for this phase (overwrites the recorded value)
    #[arg(long)]
    pub warnings: Option<u64>,

    /// Error count for this phase (overwrites the recorded value)
    #[arg(long)]
    pub errors: Option<u64>,

    /// Short summary for this phase (overwrites the recorded value)
    #[arg(long)]
    pub summary: Option<String>,

    /// Subsystem for the intel entry (skips file-name detection)
    #[arg(long)]
    pub subsystem: Option<Subsystem>,

    /// Intel log location (overrides config)
    #[arg(long)]
    pub intel_path: Option<PathBuf>,

    /// Do not lock documents while updating them. Locks are `<file>.lock`
    /// sidecar files next to each document and stay in place between runs.
    #[arg(long)]
    pub no_lock: bool,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default phasekeeper.toml file
    Init,
}

fn init_tracing(cli: &Cli) {
    if cli.quiet {
        return;
    }

    let filter = match cli.verbose {
        0 => "warn",
        1 => "warn,phasekeeper=info",
        2 => "info,phasekeeper=debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config_path = cli.config.as_deref();

    match &cli.command {
        Commands::Update(args) => {
            let mut args = args.clone();
            if cli.project_dir.is_some() && args.state_file.is_relative() {
                args.state_file = project_dir.join(&args.state_file);
            }
            cmd::cmd_update(&project_dir, config_path, &args)?;
        }
        Commands::Status { state_file } => {
            let state_file = if cli.project_dir.is_some() && state_file.is_relative() {
                project_dir.join(state_file)
            } else {
                state_file.clone()
            };
            cmd::cmd_status(&state_file)?;
        }
        Commands::Intel {
            subsystem,
            json,
            intel_path,
        } => cmd::cmd_intel(
            &project_dir,
            config_path,
            intel_path.clone(),
            *subsystem,
            *json,
        )?,
        Commands::Config { command } => cmd::cmd_config(&project_dir, config_path, command.clone())?,
    }

    Ok(())
}
