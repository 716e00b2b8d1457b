//! Stations backed by an external shell command.
//!
//! The command runs via `sh -c` in the project folder with:
//! - `FLOWMIND_PROJECT_ID`, `FLOWMIND_PROJECT_DIR`, `FLOWMIND_PHASE` in the environment
//! - `{project_id}` substituted in the command line
//!
//! Exit code 0 plus every declared artifact present means pass. Anything
//! else, including a spawn error or a timeout, is a failure.

use super::artifact::{ArtifactSpec, check_artifacts};
use super::{Station, StationContext, StationOutcome};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// File a station may write to explain why it failed.
pub const HALT_REASON_FILE: &str = "HALT_REASON.txt";

/// Longest diagnostic kept from a station's output.
const MAX_DIAGNOSTIC_CHARS: usize = 2000;

#[derive(Debug, Clone)]
pub struct CommandStation {
    command: String,
    timeout: Option<Duration>,
    artifacts: Vec<ArtifactSpec>,
}

impl CommandStation {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
            artifacts: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_artifacts(mut self, artifacts: Vec<ArtifactSpec>) -> Self {
        self.artifacts = artifacts;
        self
    }

    /// The command line with placeholders filled in.
    pub fn render(&self, project_id: &str) -> String {
        self.command.replace("{project_id}", project_id)
    }

    async fn execute(&self, ctx: &StationContext) -> Result<std::process::Output, String> {
        let command = self.render(&ctx.project_id);
        tracing::debug!(phase = %ctx.phase, command = %command, "running station");

        let project_dir =
            std::path::absolute(&ctx.project_dir).unwrap_or_else(|_| ctx.project_dir.clone());
        // A reason left by an earlier attempt must not be reported again.
        let _ = std::fs::remove_file(project_dir.join(HALT_REASON_FILE));

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("FLOWMIND_PROJECT_ID", &ctx.project_id)
            .env("FLOWMIND_PROJECT_DIR", &project_dir)
            .env("FLOWMIND_PHASE", ctx.phase.as_str())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn station command '{}': {}", command, e))?;

        let waited = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(format!(
                        "station timed out after {} seconds",
                        limit.as_secs()
                    ));
                }
            },
            None => child.wait_with_output().await,
        };
        waited.map_err(|e| format!("failed to wait for station command: {}", e))
    }
}

fn truncate(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        trimmed.to_string()
    } else {
        let tail: String = trimmed
            .chars()
            .rev()
            .take(MAX_DIAGNOSTIC_CHARS)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("...{}", tail)
    }
}

/// Contents of `HALT_REASON.txt`, if a station left a non-empty one.
pub fn read_halt_reason(project_dir: &Path) -> Option<String> {
    std::fs::read_to_string(project_dir.join(HALT_REASON_FILE))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[async_trait]
impl Station for CommandStation {
    fn name(&self) -> String {
        self.command.clone()
    }

    async fn run(&self, ctx: &StationContext) -> StationOutcome {
        let output = match self.execute(ctx).await {
            Ok(output) => output,
            Err(message) => return StationOutcome::fail(message),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stdout.trim().is_empty() {
            tracing::debug!(phase = %ctx.phase, stdout = %stdout.trim(), "station stdout");
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(phase = %ctx.phase, stderr = %stderr.trim(), "station stderr");
        }

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let reason = read_halt_reason(&ctx.project_dir).unwrap_or_else(|| {
                let diagnostic = if !stderr.trim().is_empty() {
                    truncate(&stderr)
                } else {
                    truncate(&stdout)
                };
                if diagnostic.is_empty() {
                    format!("station exited with code {}", code)
                } else {
                    format!("station exited with code {}: {}", code, diagnostic)
                }
            });
            return StationOutcome::fail(reason);
        }

        let problems = check_artifacts(&ctx.project_dir, &self.artifacts);
        if !problems.is_empty() {
            return StationOutcome::fail(format!("artifact check failed: {}", problems.join("; ")));
        }

        StationOutcome::pass()
    }
}
