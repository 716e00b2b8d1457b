//! Project lifecycle and inspection commands.

use anyhow::Result;
use flowmind::archive::archive_project;
use flowmind::engine::HaltStatus;
use flowmind::errors::DispatchError;
use flowmind_common::{ContentMode, Phase};

use super::super::Cli;
use super::open_session;

pub fn cmd_init(cli: &Cli, project_id: Option<&str>) -> Result<()> {
    let session = open_session(cli)?;
    let project_id = match project_id {
        Some(id) => id.to_string(),
        None => format!("FM_{}", chrono::Utc::now().timestamp()),
    };

    let (state, created) = session.engine.init(&project_id)?;
    if created {
        println!(
            "{} Created {} at {}",
            console::style("✓").green(),
            console::style(&project_id).bold(),
            session.config.project_dir(&project_id).display()
        );
    } else {
        println!("{} already exists at phase {}", project_id, state.phase);
    }
    Ok(())
}

pub fn cmd_status(cli: &Cli, project_id: &str) -> Result<()> {
    let session = open_session(cli)?;
    let engine = &session.engine;
    let state = engine.status(project_id)?;

    println!();
    println!("Project {}", console::style(project_id).bold());
    println!("  Phase:      {}", console::style(state.phase).cyan());
    match engine.plan().next_after(state.phase) {
        Some(next) => println!("  Next:       {}", next),
        None => println!("  Next:       -"),
    }
    println!(
        "  QA passed:  {}",
        state.qa_passed.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
    );
    if let Some(mode) = state.mode {
        let locked = if state.mode_locked { " (locked)" } else { "" };
        println!("  Mode:       {}{}", mode, locked);
    } else if state.mode_locked {
        println!("  Mode:       - (locked)");
    }
    if let Some(approval) = state.approval_status {
        println!("  Approval:   {}", approval);
    }

    match engine.halt_controller().status(&state) {
        HaltStatus::Normal => {}
        HaltStatus::Halted {
            halt_phase,
            resume_from,
            halt_count,
            reason,
        } => {
            println!(
                "  Halt:       {} at {} (resume from {}), attempt {}/{}",
                console::style("HALTED").yellow().bold(),
                halt_phase.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
                resume_from.map(|p| p.to_string()).unwrap_or_else(|| "?".into()),
                halt_count,
                engine.halt_controller().max_attempts()
            );
            if let Some(reason) = reason {
                println!("  Reason:     {}", reason);
            }
        }
        HaltStatus::HardStopped { halt_count } => {
            println!(
                "  Halt:       {} after {} attempts; run 'flowmind unlock {}'",
                console::style("HARD STOP").red().bold(),
                halt_count,
                project_id
            );
        }
    }
    println!("  Updated:    {}", state.updated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    Ok(())
}

pub fn cmd_validate(cli: &Cli, project_id: &str) -> Result<()> {
    let session = open_session(cli)?;
    let engine = &session.engine;

    let warnings = session.config.file().validate();
    if warnings.is_empty() {
        println!("{} Configuration OK", console::style("✓").green());
    } else {
        println!("{} Configuration warnings:", console::style("!").yellow());
        for warning in &warnings {
            println!("  - {}", warning);
        }
    }

    let state = engine.status(project_id)?;
    if state.phase != Phase::Halt && !engine.plan().contains(state.phase) {
        return Err(DispatchError::UnknownPhase {
            phase: state.phase.to_string(),
            variant: session.config.variant.to_string(),
        }
        .into());
    }
    println!(
        "{} {} state is valid (phase {}, {} history entries)",
        console::style("✓").green(),
        project_id,
        state.phase,
        state.phase_history.len()
    );
    Ok(())
}

pub fn cmd_history(cli: &Cli, project_id: &str, limit: Option<usize>) -> Result<()> {
    let session = open_session(cli)?;
    let entries = session.engine.history(project_id)?;
    if entries.is_empty() {
        println!("No transitions recorded for {}", project_id);
        return Ok(());
    }

    let skip = limit.map(|n| entries.len().saturating_sub(n)).unwrap_or(0);
    println!(
        "{:<20} {:<20} {:<20} {:<13} Detail",
        "Timestamp", "From", "To", "Status"
    );
    for record in entries.iter().skip(skip) {
        println!(
            "{:<20} {:<20} {:<20} {:<13} {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.from.to_string(),
            record.to.to_string(),
            record.status.to_string(),
            record.detail.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub fn cmd_mode(cli: &Cli, project_id: &str, mode: ContentMode) -> Result<()> {
    let session = open_session(cli)?;
    let _lock = session.lock(project_id)?;
    let previous = session.engine.set_mode(project_id, mode)?;
    match previous {
        Some(previous) if previous == mode => println!("{} mode is already {}", project_id, mode),
        _ => println!("{} {} mode set to {}", console::style("✓").green(), project_id, mode),
    }
    Ok(())
}

pub fn cmd_archive(cli: &Cli, project_id: &str, force: bool) -> Result<()> {
    let session = open_session(cli)?;
    let dest = archive_project(
        &session.engine,
        &session.config.archive_dir(),
        project_id,
        force,
    )?;
    println!(
        "{} Archived {} to {}",
        console::style("✓").green(),
        project_id,
        dest.display()
    );
    Ok(())
}
