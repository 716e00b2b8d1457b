//! Moving finished projects out of the active projects root.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

use crate::engine::TransitionEngine;
use crate::orchestrator::OrchLock;

/// Move `<projects_dir>/<ID>` to `<archive_dir>/<ID>`.
///
/// The folder keeps its name so the identity invariant still holds inside
/// the archive. Only projects at the plan's terminal phase are moved unless
/// `force` is set, and never while an orchestrator holds the project lock.
pub fn archive_project(
    engine: &TransitionEngine,
    archive_dir: &Path,
    project_id: &str,
    force: bool,
) -> Result<PathBuf> {
    let state = engine.status(project_id)?;

    if !force && !engine.plan().is_terminal(state.phase) {
        bail!(
            "Project {} is at {}, not {}; use --force to archive anyway",
            project_id,
            state.phase,
            engine.plan().terminal()
        );
    }

    let source = engine.project_dir(project_id);
    let dest = archive_dir.join(project_id);
    if dest.exists() {
        bail!("Archive destination {} already exists", dest.display());
    }

    // Fails with `Locked` while a run is in progress.
    drop(OrchLock::acquire(&source, project_id)?);

    std::fs::create_dir_all(archive_dir)
        .with_context(|| format!("Failed to create {}", archive_dir.display()))?;
    std::fs::rename(&source, &dest).with_context(|| {
        format!("Failed to move {} to {}", source.display(), dest.display())
    })?;

    tracing::info!(project = %project_id, dest = %dest.display(), phase = %state.phase, "project archived");
    Ok(dest)
}
