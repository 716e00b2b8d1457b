//! Stations do the real work of a phase; the dispatcher only judges them.
//!
//! A station is anything implementing [`Station`]: an external command, a
//! Telegram approval poll, or a stub in tests. The engine runs the station
//! registered for a target phase and maps the returned [`Verdict`] onto the
//! commit / halt / pending paths.

pub mod artifact;
pub mod command;

pub use artifact::{ArtifactSpec, check_artifacts};
pub use command::{CommandStation, HALT_REASON_FILE, read_halt_reason};

use crate::config::FlowmindConfig;
use crate::notify::telegram::{TelegramApprovalStation, TelegramClient};
use async_trait::async_trait;
use flowmind_common::{GateKind, Phase};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How a station judged its phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
    /// The external actor has not answered yet. Not an error.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationOutcome {
    pub verdict: Verdict,
    pub detail: Option<String>,
}

impl StationOutcome {
    pub fn pass() -> Self {
        Self {
            verdict: Verdict::Pass,
            detail: None,
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Fail,
            detail: Some(detail.into()),
        }
    }

    pub fn pending(detail: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Pending,
            detail: Some(detail.into()),
        }
    }
}

/// What a station gets to know about the project it works on.
#[derive(Debug, Clone)]
pub struct StationContext {
    pub project_id: String,
    pub project_dir: PathBuf,
    pub phase: Phase,
}

#[async_trait]
pub trait Station: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> String;

    async fn run(&self, ctx: &StationContext) -> StationOutcome;
}

/// Phase → station lookup.
#[derive(Default, Clone)]
pub struct StationRegistry {
    stations: BTreeMap<Phase, Arc<dyn Station>>,
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, phase: Phase, station: Arc<dyn Station>) {
        self.stations.insert(phase, station);
    }

    pub fn with(mut self, phase: Phase, station: impl Station + 'static) -> Self {
        self.register(phase, Arc::new(station));
        self
    }

    pub fn get(&self, phase: Phase) -> Option<Arc<dyn Station>> {
        self.stations.get(&phase).cloned()
    }

    pub fn phases(&self) -> impl Iterator<Item = Phase> + '_ {
        self.stations.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Build the registry declared in `flowmind.toml`.
    ///
    /// `[stations.PHASE]` entries become command stations. Approval gates
    /// without a command get the Telegram station when Telegram is enabled
    /// and configured; otherwise they wait for a manual verdict.
    pub fn from_config(config: &FlowmindConfig) -> Self {
        let mut registry = Self::new();

        for (phase, station) in &config.stations {
            let mut command = CommandStation::new(&station.command)
                .with_artifacts(station.artifacts.clone());
            if let Some(secs) = station.timeout_secs {
                command = command.with_timeout(Duration::from_secs(secs));
            }
            registry.register(*phase, Arc::new(command));
        }

        if let Some(settings) = &config.telegram {
            let client = Arc::new(TelegramClient::new(settings));
            for (phase, kind) in &config.plan.gates {
                if *kind == GateKind::Approval && registry.get(*phase).is_none() {
                    let station = TelegramApprovalStation::new(
                        client.clone(),
                        config.listener_state_path(),
                        settings.approval_timeout,
                    );
                    registry.register(*phase, Arc::new(station));
                }
            }
        }

        tracing::debug!(count = registry.len(), "station registry built");
        registry
    }
}
