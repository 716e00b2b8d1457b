//! The `run` command: one step, a recovery, or the orchestrator loop.

use anyhow::Result;
use flowmind::orchestrator::{LoopExit, Orchestrator};
use std::time::Duration;

use super::super::Cli;
use super::{open_session, print_outcome};

pub async fn cmd_run(
    cli: &Cli,
    project_id: &str,
    run_loop: bool,
    recover: bool,
    interval: Option<u64>,
) -> Result<()> {
    let session = open_session(cli)?;
    let interval = interval
        .map(Duration::from_secs)
        .unwrap_or(session.config.interval);
    let orchestrator = Orchestrator::new(session.engine.clone()).with_interval(interval);

    if recover {
        match orchestrator.recover(project_id).await? {
            Some(outcome) => print_outcome(project_id, &outcome),
            None => println!("{} is not halted; nothing to recover", project_id),
        }
        return Ok(());
    }

    if !run_loop {
        let outcome = orchestrator.run_once(project_id).await?;
        print_outcome(project_id, &outcome);
        return Ok(());
    }

    println!(
        "Running {} every {}s (Ctrl-C to stop)",
        console::style(project_id).bold(),
        interval.as_secs()
    );
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    let report = orchestrator
        .run_loop(project_id, shutdown, |outcome| print_outcome(project_id, outcome))
        .await?;

    if report.exit == LoopExit::Interrupted {
        println!();
        println!("Stopped after {} step(s).", report.steps.len());
    }
    Ok(())
}
