//! Outer driver that keeps advancing a project until it needs someone.
//!
//! The loop holds the project's [`OrchLock`] for its whole lifetime and asks
//! the engine for the next phase every `interval`. It keeps going while the
//! engine reports progress or a pending station, and stops at the first
//! terminal, blocking or failing result.

mod lock;

pub use lock::{LOCK_FILE_NAME, LockMetadata, OrchLock};

use crate::engine::{TransitionEngine, TransitionOutcome};
use crate::errors::DispatchError;
use crate::guard;
use flowmind_common::Phase;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Why `run_loop` returned without an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    Terminal { phase: Phase },
    AwaitingInput { phase: Phase },
    /// The engine reported nothing left to do at `phase`.
    Settled { phase: Phase },
    /// The shutdown signal fired.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub steps: Vec<TransitionOutcome>,
    pub exit: LoopExit,
}

pub struct Orchestrator {
    engine: Arc<TransitionEngine>,
    interval: Duration,
}

impl Orchestrator {
    pub fn new(engine: Arc<TransitionEngine>) -> Self {
        Self {
            engine,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    fn lock(&self, project_id: &str) -> Result<OrchLock, DispatchError> {
        guard::validate_project_id(project_id)?;
        OrchLock::acquire(&self.engine.project_dir(project_id), project_id)
    }

    /// A single `advance` under the lock.
    pub async fn run_once(&self, project_id: &str) -> Result<TransitionOutcome, DispatchError> {
        let _lock = self.lock(project_id)?;
        self.engine.advance(project_id, None).await
    }

    /// A single `resume` under the lock.
    pub async fn recover(&self, project_id: &str) -> Result<Option<TransitionOutcome>, DispatchError> {
        let _lock = self.lock(project_id)?;
        self.engine.resume(project_id).await
    }

    /// Advance repeatedly until the project is terminal, blocked or failing,
    /// or until `shutdown` completes. `on_step` sees every outcome as it
    /// happens.
    pub async fn run_loop<S, F>(
        &self,
        project_id: &str,
        shutdown: S,
        mut on_step: F,
    ) -> Result<RunReport, DispatchError>
    where
        S: Future<Output = ()>,
        F: FnMut(&TransitionOutcome),
    {
        let _lock = self.lock(project_id)?;
        tokio::pin!(shutdown);

        let mut steps = Vec::new();
        let mut iteration: u64 = 0;
        loop {
            iteration += 1;
            tracing::debug!(project = %project_id, iteration, "orchestrator iteration");

            let outcome = tokio::select! {
                result = self.engine.advance(project_id, None) => result?,
                _ = &mut shutdown => {
                    tracing::info!(project = %project_id, "orchestrator interrupted");
                    return Ok(RunReport { steps, exit: LoopExit::Interrupted });
                }
            };
            on_step(&outcome);

            let exit = match &outcome {
                TransitionOutcome::Advanced { .. } | TransitionOutcome::Pending { .. } => None,
                TransitionOutcome::Terminal { phase } => Some(LoopExit::Terminal { phase: *phase }),
                TransitionOutcome::AwaitingInput { phase } => {
                    Some(LoopExit::AwaitingInput { phase: *phase })
                }
                TransitionOutcome::AlreadyAt { current, .. } => {
                    Some(LoopExit::Settled { phase: *current })
                }
            };
            steps.push(outcome);

            if let Some(exit) = exit {
                tracing::info!(project = %project_id, steps = steps.len(), exit = ?exit, "orchestrator stopped");
                return Ok(RunReport { steps, exit });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    tracing::info!(project = %project_id, "orchestrator interrupted");
                    return Ok(RunReport { steps, exit: LoopExit::Interrupted });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::FsAuditLog;
    use crate::station::{CommandStation, StationRegistry};
    use crate::store::FsStateStore;
    use flowmind_common::PipelinePlan;
    use std::path::Path;
    use tempfile::tempdir;

    fn orchestrator(root: &Path, plan: PipelinePlan, stations: StationRegistry) -> Orchestrator {
        let engine = TransitionEngine::new(
            Arc::new(FsStateStore::new(root)),
            Arc::new(FsAuditLog::new(root)),
            plan,
        )
        .with_stations(stations)
        .with_projects_dir(root.to_path_buf());
        Orchestrator::new(Arc::new(engine)).with_interval(Duration::from_millis(1))
    }

    fn never() -> impl Future<Output = ()> {
        std::future::pending()
    }

    #[tokio::test]
    async fn test_loop_runs_to_terminal() {
        let dir = tempdir().unwrap();
        let stations = StationRegistry::new().with(Phase::Qa, CommandStation::new("exit 0"));
        let orch = orchestrator(dir.path(), PipelinePlan::simple(), stations);

        let mut seen = Vec::new();
        let report = orch
            .run_loop("FM_1", never(), |outcome| seen.push(outcome.phase()))
            .await
            .unwrap();

        assert_eq!(report.exit, LoopExit::Terminal { phase: Phase::Done });
        assert_eq!(report.steps.len(), 8);
        assert_eq!(seen.first(), Some(&Phase::Script));
        assert!(!OrchLock::path_for(&dir.path().join("FM_1")).exists());
    }

    #[tokio::test]
    async fn test_loop_stops_at_unattended_gate() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), PipelinePlan::production(), StationRegistry::new());

        let report = orch.run_loop("FM_1", never(), |_| {}).await.unwrap();
        assert_eq!(
            report.exit,
            LoopExit::AwaitingInput {
                phase: Phase::ScenesQa
            }
        );
    }

    #[tokio::test]
    async fn test_loop_stops_on_gate_failure() {
        let dir = tempdir().unwrap();
        let stations = StationRegistry::new().with(Phase::Qa, CommandStation::new("exit 1"));
        let orch = orchestrator(dir.path(), PipelinePlan::simple(), stations);

        let err = orch.run_loop("FM_1", never(), |_| {}).await.unwrap_err();
        assert!(matches!(err, DispatchError::RecoverableHalt { phase: Phase::Qa, .. }));

        let outcome = orch.recover("FM_1").await.unwrap().unwrap();
        assert_eq!(outcome.phase(), Phase::Thumbnail);
    }

    #[tokio::test]
    async fn test_held_lock_blocks_run() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), PipelinePlan::simple(), StationRegistry::new());
        let _held = OrchLock::acquire(&dir.path().join("FM_1"), "FM_1").unwrap();

        let err = orch.run_once("FM_1").await.unwrap_err();
        assert!(matches!(err, DispatchError::Locked { .. }));
    }

    #[tokio::test]
    async fn test_invalid_id_does_not_create_folder() {
        let dir = tempdir().unwrap();
        let orch = orchestrator(dir.path(), PipelinePlan::simple(), StationRegistry::new());
        assert!(orch.run_once("../escape").await.is_err());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_interrupts_running_station() {
        let dir = tempdir().unwrap();
        let stations = StationRegistry::new().with(Phase::Script, CommandStation::new("sleep 30"));
        let orch = orchestrator(dir.path(), PipelinePlan::simple(), stations);

        let shutdown = tokio::time::sleep(Duration::from_millis(200));
        let report = orch.run_loop("FM_1", shutdown, |_| {}).await.unwrap();
        assert_eq!(report.exit, LoopExit::Interrupted);
        assert!(report.steps.is_empty());
    }
}
