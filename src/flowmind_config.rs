//! The `flowmind.toml` configuration file.
//!
//! Every section is optional and defaulted, so an absent file behaves like:
//!
//! ```toml
//! [project]
//! projects_dir = "projects"
//!
//! [pipeline]
//! variant = "production"      # simple | production | delivery | custom
//!
//! [halt]
//! max_attempts = 3
//!
//! [orchestrator]
//! interval_secs = 5
//!
//! [telegram]
//! enabled = false
//! approval_timeout_secs = 30
//! ```
//!
//! A custom pipeline lists its phases inline:
//!
//! ```toml
//! [pipeline]
//! variant = "custom"
//! phases = ["TOPIC", "SCRIPT", "QA", "UPLOAD"]
//! upload_phases = ["UPLOAD"]
//! gates = { QA = "qa" }
//! ```
//!
//! Stations are keyed by the phase they produce:
//!
//! ```toml
//! [stations.FINAL_QA]
//! command = "python -m engine.final_qa_v1 {project_id}"
//! timeout_secs = 600
//! artifacts = [{ path = "FINAL_QA.json", min_bytes = 1 }]
//! ```

use crate::station::ArtifactSpec;
use anyhow::{Context, Result};
use flowmind_common::{GateKind, Phase, PipelinePlan, PipelineVariant};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "flowmind.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    #[serde(default = "default_projects_dir")]
    pub projects_dir: PathBuf,
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            projects_dir: default_projects_dir(),
        }
    }
}

fn default_projects_dir() -> PathBuf {
    PathBuf::from("projects")
}

/// Pipeline selection. The plan fields only apply to `variant = "custom"`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default)]
    pub variant: PipelineVariant,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub gates: BTreeMap<Phase, GateKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upload_phases: Vec<Phase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lock_phases: Vec<Phase>,
}

impl PipelineSection {
    fn declares_plan(&self) -> bool {
        !self.phases.is_empty()
            || !self.gates.is_empty()
            || !self.upload_phases.is_empty()
            || !self.lock_phases.is_empty()
    }

    /// The plan this section selects.
    pub fn plan(&self) -> Result<PipelinePlan> {
        match PipelinePlan::for_variant(self.variant) {
            Some(plan) => Ok(plan),
            None => PipelinePlan::new(
                self.phases.clone(),
                self.gates.clone(),
                self.upload_phases.clone(),
                self.lock_phases.clone(),
            )
            .context("Invalid custom pipeline in [pipeline]"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaltSection {
    /// Consecutive gate failures before a hard stop.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for HaltSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Pause between loop iterations.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramSection {
    #[serde(default)]
    pub enabled: bool,
    /// How long one approval poll waits before reporting pending.
    #[serde(default = "default_approval_timeout_secs")]
    pub approval_timeout_secs: u64,
    /// Falls back to `TELEGRAM_BOT_TOKEN`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    /// Falls back to `TELEGRAM_CHAT_ID`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl Default for TelegramSection {
    fn default() -> Self {
        Self {
            enabled: false,
            approval_timeout_secs: default_approval_timeout_secs(),
            bot_token: None,
            chat_id: None,
            api_base: default_api_base(),
        }
    }
}

fn default_approval_timeout_secs() -> u64 {
    30
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

/// One `[stations.PHASE]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<ArtifactSpec>,
}

/// The complete flowmind.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowmindToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub halt: HaltSection,
    #[serde(default)]
    pub orchestrator: OrchestratorSection,
    #[serde(default)]
    pub telegram: TelegramSection,
    #[serde(default)]
    pub stations: BTreeMap<Phase, StationConfig>,
}

impl FlowmindToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse flowmind.toml")
    }

    /// Load `path`, or the defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.variant != PipelineVariant::Custom && self.pipeline.declares_plan() {
            warnings.push(format!(
                "[pipeline] lists phases but variant is '{}'; the built-in plan is used",
                self.pipeline.variant
            ));
        }

        match self.pipeline.plan() {
            Ok(plan) => {
                for phase in self.stations.keys() {
                    if !plan.contains(*phase) {
                        warnings.push(format!(
                            "[stations.{}] is not part of the {} pipeline and will never run",
                            phase, self.pipeline.variant
                        ));
                    }
                }
            }
            Err(e) => warnings.push(format!("{:#}", e)),
        }

        if self.halt.max_attempts == 0 {
            warnings.push("[halt] max_attempts = 0 is treated as 1".to_string());
        }

        for (phase, station) in &self.stations {
            if station.command.trim().is_empty() {
                warnings.push(format!("[stations.{}] has an empty command", phase));
            }
        }

        if self.telegram.enabled
            && (self.telegram.bot_token.is_none() || self.telegram.chat_id.is_none())
            && (std::env::var("TELEGRAM_BOT_TOKEN").is_err()
                || std::env::var("TELEGRAM_CHAT_ID").is_err())
        {
            warnings.push(
                "[telegram] is enabled but TELEGRAM_BOT_TOKEN / TELEGRAM_CHAT_ID are not set; \
                 approvals fall back to manual verdicts"
                    .to_string(),
            );
        }

        warnings
    }
}
