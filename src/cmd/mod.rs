//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                        |
//! |-----------|---------------------------------------------------------|
//! | `project` | `Init`, `Status`, `Validate`, `History`, `Mode`, `Archive` |
//! | `phase`   | `Advance`, `Resume`, `Unlock`, `Approve`, `Reject`      |
//! | `run`     | `Run`                                                   |

pub mod phase;
pub mod project;
pub mod run;

pub use phase::{cmd_advance, cmd_decide, cmd_resume, cmd_unlock};
pub use project::{cmd_archive, cmd_history, cmd_init, cmd_mode, cmd_status, cmd_validate};
pub use run::cmd_run;

use anyhow::Result;
use flowmind::config::FlowmindConfig;
use flowmind::engine::{TransitionEngine, TransitionOutcome};
use flowmind::guard;
use flowmind::orchestrator::OrchLock;
use std::sync::Arc;

use super::Cli;

/// Resolved configuration plus the engine built from it.
pub struct Session {
    pub config: FlowmindConfig,
    pub engine: Arc<TransitionEngine>,
}

impl Session {
    /// Takes the project's orchestrator lock so a manual write cannot
    /// interleave with a running loop.
    pub fn lock(&self, project_id: &str) -> Result<OrchLock> {
        guard::validate_project_id(project_id)?;
        Ok(OrchLock::acquire(
            &self.engine.project_dir(project_id),
            project_id,
        )?)
    }
}

pub fn open_session(cli: &Cli) -> Result<Session> {
    let config = FlowmindConfig::load(&cli.config, cli.projects_dir.clone())?;
    tracing::debug!(
        projects_dir = %config.projects_dir.display(),
        variant = %config.variant,
        "configuration loaded"
    );
    let engine = Arc::new(TransitionEngine::from_config(&config));
    Ok(Session { config, engine })
}

pub fn print_outcome(project_id: &str, outcome: &TransitionOutcome) {
    match outcome {
        TransitionOutcome::Advanced { from, to, resumed } => {
            let verb = if *resumed { "resumed" } else { "advanced" };
            println!(
                "{} {} {}: {} -> {}",
                console::style("✓").green(),
                project_id,
                verb,
                from,
                console::style(to).bold()
            );
        }
        TransitionOutcome::AlreadyAt { current, requested } => {
            println!(
                "{} {} is already at {} (requested {}); nothing to do",
                console::style("•").dim(),
                project_id,
                current,
                requested
            );
        }
        TransitionOutcome::Pending { phase, detail } => {
            println!(
                "{} {} waiting on {}{}",
                console::style("…").yellow(),
                project_id,
                phase,
                detail.as_deref().map(|d| format!(": {}", d)).unwrap_or_default()
            );
        }
        TransitionOutcome::AwaitingInput { phase } => {
            println!(
                "{} {} needs a verdict for {}; run 'flowmind approve {}' or 'flowmind reject {}'",
                console::style("?").yellow().bold(),
                project_id,
                phase,
                project_id,
                project_id
            );
        }
        TransitionOutcome::Terminal { phase } => {
            println!(
                "{} {} is complete at {}",
                console::style("✓").green(),
                project_id,
                console::style(phase).bold()
            );
        }
    }
}
