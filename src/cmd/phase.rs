//! Advance, resume, unlock, and approval commands.

use anyhow::Result;
use flowmind_common::Phase;

use super::super::Cli;
use super::{open_session, print_outcome};

pub async fn cmd_advance(cli: &Cli, project_id: &str, phase: Option<Phase>) -> Result<()> {
    let session = open_session(cli)?;
    let _lock = session.lock(project_id)?;
    let outcome = session.engine.advance(project_id, phase).await?;
    print_outcome(project_id, &outcome);
    Ok(())
}

pub async fn cmd_resume(cli: &Cli, project_id: &str) -> Result<()> {
    let session = open_session(cli)?;
    let _lock = session.lock(project_id)?;
    match session.engine.resume(project_id).await? {
        Some(outcome) => print_outcome(project_id, &outcome),
        None => println!("{} is not halted; nothing to resume", project_id),
    }
    Ok(())
}

pub fn cmd_unlock(cli: &Cli, project_id: &str) -> Result<()> {
    let session = open_session(cli)?;
    let state = session.engine.status(project_id)?;
    let _lock = session.lock(project_id)?;

    if !state.hard_stop {
        println!("{} is not hard-stopped; nothing to unlock", project_id);
        return Ok(());
    }

    if !cli.yes {
        println!();
        println!(
            "{} {} is hard-stopped after {} failed attempts at {}.",
            console::style("!").red().bold(),
            project_id,
            state.halt_count,
            state
                .halt_phase
                .map(|p| p.to_string())
                .unwrap_or_else(|| state.phase.to_string())
        );
        if let Some(reason) = &state.halt_reason {
            println!("  Last reason: {}", reason);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Clear the hard stop and reset the halt counter?")
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            println!("Unlock cancelled.");
            return Ok(());
        }
    }

    if session.engine.unlock(project_id)? {
        println!(
            "{} {} unlocked at {}",
            console::style("✓").green(),
            project_id,
            state.phase
        );
    }
    Ok(())
}

pub async fn cmd_decide(cli: &Cli, project_id: &str, approved: bool) -> Result<()> {
    let session = open_session(cli)?;
    let _lock = session.lock(project_id)?;
    let outcome = session.engine.decide(project_id, approved).await?;
    print_outcome(project_id, &outcome);
    Ok(())
}
