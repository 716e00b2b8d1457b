use anyhow::Result;
use clap::{Parser, Subcommand};
use flowmind::exit_code_for;
use flowmind_common::{ContentMode, Phase};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cmd;

#[derive(Parser)]
#[command(name = "flowmind")]
#[command(version, about = "Deterministic phase-state dispatcher for FlowMind video projects")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    /// Path to flowmind.toml
    #[arg(long, global = true, default_value = "flowmind.toml")]
    pub config: PathBuf,

    /// Root folder holding one subfolder per project. Overrides flowmind.toml
    #[arg(long, global = true)]
    pub projects_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a project folder and its initial state
    Init {
        /// Project ID (defaults to FM_<unix timestamp>)
        project_id: Option<String>,
    },
    /// Show the state of a project
    Status { project_id: String },
    /// Check a project's state document and the configuration
    Validate { project_id: String },
    /// Show the audit log of a project
    History {
        project_id: String,
        /// Only show the newest N records
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Advance a project to the next phase, or to PHASE
    Advance {
        project_id: String,
        phase: Option<Phase>,
    },
    /// Re-enter the last known-good phase of a halted project
    Resume { project_id: String },
    /// Clear a hard stop
    Unlock { project_id: String },
    /// Approve the gate the project is waiting on
    Approve { project_id: String },
    /// Reject the gate the project is waiting on
    Reject { project_id: String },
    /// Record the content mode (LONG or SHORT)
    Mode {
        project_id: String,
        mode: ContentMode,
    },
    /// Drive a project through its stations
    Run {
        project_id: String,
        /// Keep advancing until the project is terminal or blocked
        #[arg(long = "loop")]
        run_loop: bool,
        /// Resume a halted project instead of advancing
        #[arg(long, conflicts_with = "run_loop")]
        recover: bool,
        /// Seconds between loop iterations. Overrides flowmind.toml
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Move a finished project into the archive folder
    Archive {
        project_id: String,
        /// Archive even if the project is not at its terminal phase
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("FLOWMIND_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Init { project_id } => cmd::cmd_init(cli, project_id.as_deref())?,
        Commands::Status { project_id } => cmd::cmd_status(cli, project_id)?,
        Commands::Validate { project_id } => cmd::cmd_validate(cli, project_id)?,
        Commands::History { project_id, limit } => cmd::cmd_history(cli, project_id, *limit)?,
        Commands::Advance { project_id, phase } => {
            cmd::cmd_advance(cli, project_id, *phase).await?
        }
        Commands::Resume { project_id } => cmd::cmd_resume(cli, project_id).await?,
        Commands::Unlock { project_id } => cmd::cmd_unlock(cli, project_id)?,
        Commands::Approve { project_id } => cmd::cmd_decide(cli, project_id, true).await?,
        Commands::Reject { project_id } => cmd::cmd_decide(cli, project_id, false).await?,
        Commands::Mode { project_id, mode } => cmd::cmd_mode(cli, project_id, *mode)?,
        Commands::Run {
            project_id,
            run_loop,
            recover,
            interval,
        } => cmd::cmd_run(cli, project_id, *run_loop, *recover, *interval).await?,
        Commands::Archive { project_id, force } => cmd::cmd_archive(cli, project_id, *force)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Exported variables win over .env.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(err) = run(&cli).await {
        eprintln!("{} {:#}", console::style("error:").red().bold(), err);
        std::process::exit(exit_code_for(&err));
    }
}
