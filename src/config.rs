use anyhow::{Context, Result};
use flowmind_common::{Phase, PipelinePlan, PipelineVariant};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::flowmind_config::{FlowmindToml, StationConfig};

/// File in the projects root that remembers the Telegram update offset.
pub const LISTENER_STATE_FILE: &str = "telegram_listener_state.json";
/// Folder in the projects root that receives archived projects.
pub const ARCHIVE_DIR_NAME: &str = "_archive";

/// Resolved Telegram credentials and limits.
#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: String,
    pub chat_id: String,
    pub api_base: String,
    pub approval_timeout: Duration,
}

/// Runtime configuration for the dispatcher.
///
/// Built from `flowmind.toml`, then the environment, then CLI flags, each
/// layer overriding the previous one.
#[derive(Debug, Clone)]
pub struct FlowmindConfig {
    pub projects_dir: PathBuf,
    pub variant: PipelineVariant,
    pub plan: PipelinePlan,
    pub max_halt_attempts: u32,
    pub interval: Duration,
    /// `None` unless Telegram is enabled and fully configured.
    pub telegram: Option<TelegramSettings>,
    pub stations: BTreeMap<Phase, StationConfig>,
    toml: FlowmindToml,
}

impl FlowmindConfig {
    /// Load `config_path` (optional) and layer environment and CLI overrides.
    pub fn load(config_path: &Path, projects_dir: Option<PathBuf>) -> Result<Self> {
        let toml = FlowmindToml::load_or_default(config_path)?;
        Self::resolve_with_env(toml, projects_dir, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn resolve_with_env<F>(
        toml: FlowmindToml,
        projects_dir: Option<PathBuf>,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let plan = toml.pipeline.plan()?;

        let projects_dir = projects_dir
            .or_else(|| env("FLOWMIND_PROJECTS_DIR").map(PathBuf::from))
            .unwrap_or_else(|| toml.project.projects_dir.clone());

        let max_halt_attempts = match env("FLOWMIND_MAX_HALT_ATTEMPTS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid FLOWMIND_MAX_HALT_ATTEMPTS '{}'", raw))?,
            None => toml.halt.max_attempts,
        }
        .max(1);

        let telegram = if toml.telegram.enabled {
            let token = toml
                .telegram
                .bot_token
                .clone()
                .or_else(|| env("TELEGRAM_BOT_TOKEN"))
                .filter(|s| !s.trim().is_empty());
            let chat_id = toml
                .telegram
                .chat_id
                .clone()
                .or_else(|| env("TELEGRAM_CHAT_ID"))
                .filter(|s| !s.trim().is_empty());
            match (token, chat_id) {
                (Some(bot_token), Some(chat_id)) => Some(TelegramSettings {
                    bot_token,
                    chat_id,
                    api_base: toml.telegram.api_base.trim_end_matches('/').to_string(),
                    approval_timeout: Duration::from_secs(toml.telegram.approval_timeout_secs),
                }),
                _ => {
                    tracing::warn!(
                        "telegram enabled without TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID; using manual approvals"
                    );
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            projects_dir,
            variant: toml.pipeline.variant,
            plan,
            max_halt_attempts,
            interval: Duration::from_secs(toml.orchestrator.interval_secs),
            telegram,
            stations: toml.stations.clone(),
            toml,
        })
    }

    /// The parsed configuration file this was resolved from.
    pub fn file(&self) -> &FlowmindToml {
        &self.toml
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.projects_dir.join(project_id)
    }

    pub fn listener_state_path(&self) -> PathBuf {
        self.projects_dir.join(LISTENER_STATE_FILE)
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.projects_dir.join(ARCHIVE_DIR_NAME)
    }
}
