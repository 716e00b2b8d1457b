//! Phase transition engine.
//!
//! The engine is the only component that mutates project state. Every
//! request runs the same ordered checks (hard stop, target resolution,
//! upload gate, rollback lock, halt state, idempotency) before a station
//! is consulted, and every pre-mutation rejection leaves both the state
//! document and the audit log untouched.

pub mod halt;

pub use halt::{DEFAULT_MAX_HALT_ATTEMPTS, FailureEscalation, HaltController, HaltStatus};

use crate::audit::{AuditLog, AuditRecord, AuditStatus, FsAuditLog, resume_target};
use crate::config::FlowmindConfig;
use crate::errors::DispatchError;
use crate::guard;
use crate::station::{StationContext, StationRegistry, Verdict};
use crate::store::{FsStateStore, STATE_FILE_NAME, StateStore};
use flowmind_common::{ContentMode, GateKind, Phase, PipelinePlan, ProjectState};
use std::path::PathBuf;
use std::sync::Arc;

/// Successful results of an `advance` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The phase moved and was committed.
    Advanced { from: Phase, to: Phase, resumed: bool },
    /// The requested phase was already reached; nothing changed.
    AlreadyAt { current: Phase, requested: Phase },
    /// The station for `phase` is waiting on an external answer.
    Pending { phase: Phase, detail: Option<String> },
    /// `phase` is gated and has no station; a manual verdict is required.
    AwaitingInput { phase: Phase },
    /// The project is at the end of its pipeline.
    Terminal { phase: Phase },
}

impl TransitionOutcome {
    /// The phase this outcome is about.
    pub fn phase(&self) -> Phase {
        match self {
            TransitionOutcome::Advanced { to, .. } => *to,
            TransitionOutcome::AlreadyAt { current, .. } => *current,
            TransitionOutcome::Pending { phase, .. }
            | TransitionOutcome::AwaitingInput { phase }
            | TransitionOutcome::Terminal { phase } => *phase,
        }
    }
}

pub struct TransitionEngine {
    store: Arc<dyn StateStore>,
    audit: Arc<dyn AuditLog>,
    stations: StationRegistry,
    plan: PipelinePlan,
    variant: String,
    halt: HaltController,
    projects_dir: PathBuf,
}

impl TransitionEngine {
    pub fn new(store: Arc<dyn StateStore>, audit: Arc<dyn AuditLog>, plan: PipelinePlan) -> Self {
        Self {
            store,
            audit,
            stations: StationRegistry::new(),
            plan,
            variant: "custom".to_string(),
            halt: HaltController::default(),
            projects_dir: PathBuf::from("projects"),
        }
    }

    /// Filesystem-backed engine for the configured projects root.
    pub fn from_config(config: &FlowmindConfig) -> Self {
        let store = Arc::new(FsStateStore::new(&config.projects_dir));
        let audit = Arc::new(FsAuditLog::new(&config.projects_dir));
        Self::new(store, audit, config.plan.clone())
            .with_stations(StationRegistry::from_config(config))
            .with_max_attempts(config.max_halt_attempts)
            .with_projects_dir(config.projects_dir.clone())
            .with_variant(config.variant.to_string())
    }

    pub fn with_stations(mut self, stations: StationRegistry) -> Self {
        self.stations = stations;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.halt = HaltController::new(max_attempts);
        self
    }

    pub fn with_projects_dir(mut self, projects_dir: PathBuf) -> Self {
        self.projects_dir = projects_dir;
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    pub fn halt_controller(&self) -> &HaltController {
        &self.halt
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.projects_dir.join(project_id)
    }

    /// Create the state document if it does not exist yet.
    ///
    /// Returns the current state and whether it was created by this call.
    pub fn init(&self, project_id: &str) -> Result<(ProjectState, bool), DispatchError> {
        guard::validate_project_id(project_id)?;
        if let Some(state) = self.store.load(project_id)? {
            return Ok((state, false));
        }
        let initial = self.plan.initial();
        let mut state = ProjectState::new(project_id, initial);
        state.push_history(initial, None, "CREATED");
        self.store.save(project_id, &state)?;
        tracing::info!(project = %project_id, phase = %initial, "project created");
        Ok((state, true))
    }

    /// Load an existing project, failing with `StateMissing` if it was never written.
    pub fn status(&self, project_id: &str) -> Result<ProjectState, DispatchError> {
        guard::validate_project_id(project_id)?;
        self.store
            .load(project_id)?
            .ok_or_else(|| DispatchError::StateMissing {
                project_id: project_id.to_string(),
            })
    }

    pub fn halt_status(&self, project_id: &str) -> Result<HaltStatus, DispatchError> {
        let state = self.status(project_id)?;
        Ok(self.halt.status(&state))
    }

    pub fn history(&self, project_id: &str) -> Result<Vec<AuditRecord>, DispatchError> {
        guard::validate_project_id(project_id)?;
        self.audit.entries(project_id)
    }

    /// Move a project to `requested`, or to the next phase of the plan.
    pub async fn advance(
        &self,
        project_id: &str,
        requested: Option<Phase>,
    ) -> Result<TransitionOutcome, DispatchError> {
        let (mut state, _) = self.init(project_id)?;

        if state.hard_stop {
            return Err(Self::hard_stop_error(project_id, &state));
        }

        let current = self.normalize(project_id, &mut state)?;
        let next = self.plan.next_after(current);

        let target = match requested.or(next) {
            Some(target) => target,
            None => return Ok(TransitionOutcome::Terminal { phase: current }),
        };

        if !self.plan.contains(target) {
            return Err(self.unknown_phase(target));
        }

        if self.plan.requires_qa(target) && state.qa_passed != Some(true) {
            return Err(DispatchError::GateNotSatisfied {
                phase: target,
                reason: format!("qa_passed is {:?}, not true", state.qa_passed),
            });
        }

        let resuming = state.halted && state.resume_from == Some(target);
        if state.mode_locked && !resuming && Some(target) != next {
            self.store.seal(project_id)?;
            tracing::warn!(project = %project_id, current = %current, requested = %target, "rollback refused");
            return Err(DispatchError::RollbackForbidden {
                current,
                requested: target,
            });
        }

        if state.halted {
            if resuming {
                return self.commit(project_id, state, target, AuditStatus::Resume, None, None);
            }
            if state.halt_phase != Some(target) {
                return Err(DispatchError::Halted {
                    project_id: project_id.to_string(),
                    halt_phase: state.halt_phase.unwrap_or(target),
                    resume_from: state.resume_from,
                });
            }
            tracing::info!(project = %project_id, phase = %target, attempt = state.halt_count + 1, "retrying halted phase");
        } else if self.plan.is_reached(current, target) {
            return Ok(TransitionOutcome::AlreadyAt {
                current,
                requested: target,
            });
        }

        self.run_station(project_id, state, current, target).await
    }

    /// Re-enter the last known-good phase of a halted project.
    ///
    /// Returns `None` when there is nothing to resume.
    pub async fn resume(&self, project_id: &str) -> Result<Option<TransitionOutcome>, DispatchError> {
        let mut state = self.status(project_id)?;
        if state.hard_stop {
            return Err(Self::hard_stop_error(project_id, &state));
        }
        if !state.halted && state.phase != Phase::Halt {
            return Ok(None);
        }
        self.normalize(project_id, &mut state)?;
        match state.resume_from {
            Some(target) => self.advance(project_id, Some(target)).await.map(Some),
            None => Ok(None),
        }
    }

    /// Clear a hard stop. Returns false (and writes nothing) when there was none.
    pub fn unlock(&self, project_id: &str) -> Result<bool, DispatchError> {
        let mut state = self.status(project_id)?;
        if !self.halt.unlock(&mut state) {
            return Ok(false);
        }
        let phase = state.phase;
        state.project_id = project_id.to_string();
        state.push_history(phase, None, AuditStatus::ManualUnlock.as_str());
        state.touch();
        self.store.save(project_id, &state)?;
        self.audit.append(&AuditRecord::new(
            project_id,
            phase,
            phase,
            AuditStatus::ManualUnlock,
        ))?;
        tracing::info!(project = %project_id, phase = %phase, "hard stop cleared");
        Ok(true)
    }

    /// Manual verdict for the approval gate the project is waiting on.
    pub async fn decide(
        &self,
        project_id: &str,
        approved: bool,
    ) -> Result<TransitionOutcome, DispatchError> {
        let mut state = self.status(project_id)?;
        if state.hard_stop {
            return Err(Self::hard_stop_error(project_id, &state));
        }
        let current = self.normalize(project_id, &mut state)?;
        let target = if state.halted {
            state.halt_phase
        } else {
            self.plan.next_after(current)
        };
        let Some(target) = target.filter(|p| self.plan.gate(*p) == Some(GateKind::Approval)) else {
            return Err(DispatchError::Usage(format!(
                "project {} is at {} and not waiting for an approval",
                project_id, current
            )));
        };

        if approved {
            self.commit(
                project_id,
                state,
                target,
                AuditStatus::Ok,
                Some(GateKind::Approval),
                Some("approved by operator".to_string()),
            )
        } else {
            self.gate_failure(
                project_id,
                state,
                current,
                target,
                GateKind::Approval,
                "rejected by operator",
            )
        }
    }

    /// Record the content mode. Returns the previous mode.
    pub fn set_mode(
        &self,
        project_id: &str,
        mode: ContentMode,
    ) -> Result<Option<ContentMode>, DispatchError> {
        let mut state = self.status(project_id)?;
        if state.hard_stop {
            return Err(Self::hard_stop_error(project_id, &state));
        }
        if state.mode_locked && state.mode.is_some() && state.mode != Some(mode) {
            return Err(DispatchError::GateNotSatisfied {
                phase: state.phase,
                reason: "content mode is locked after assembly".to_string(),
            });
        }
        let previous = state.mode.replace(mode);
        state.project_id = project_id.to_string();
        state.touch();
        self.store.save(project_id, &state)?;
        tracing::info!(project = %project_id, mode = %mode, "content mode set");
        Ok(previous)
    }

    /// Resolve the phase the project effectively sits at, filling in a
    /// missing resume point for halted and legacy `HALT` documents.
    fn normalize(&self, project_id: &str, state: &mut ProjectState) -> Result<Phase, DispatchError> {
        let legacy = state.phase == Phase::Halt;

        // Halts never move `phase`, so a halted document's own phase is its
        // last known-good one. Only legacy HALT documents need the audit trail.
        if state.resume_from.is_none() {
            if legacy {
                state.resume_from = resume_target(&self.audit.entries(project_id)?);
            } else if state.halted {
                state.resume_from = Some(state.phase);
            }
        }

        if legacy {
            let Some(resume_from) = state.resume_from else {
                return Err(DispatchError::StateCorrupt {
                    path: self.project_dir(project_id).join(STATE_FILE_NAME),
                    message: "phase is HALT but no resume point is recorded".to_string(),
                });
            };
            state.halted = true;
            if state.halt_phase.is_none() {
                state.halt_phase = self.plan.next_after(resume_from);
            }
            return Ok(resume_from);
        }

        if !self.plan.contains(state.phase) {
            return Err(self.unknown_phase(state.phase));
        }
        Ok(state.phase)
    }

    async fn run_station(
        &self,
        project_id: &str,
        state: ProjectState,
        current: Phase,
        target: Phase,
    ) -> Result<TransitionOutcome, DispatchError> {
        let gate = self.plan.gate(target);

        let Some(station) = self.stations.get(target) else {
            if gate.is_some() {
                tracing::info!(project = %project_id, phase = %target, "gated phase awaiting a verdict");
                return Ok(TransitionOutcome::AwaitingInput { phase: target });
            }
            return self.commit(project_id, state, target, AuditStatus::Ok, None, None);
        };

        let ctx = StationContext {
            project_id: project_id.to_string(),
            project_dir: self.project_dir(project_id),
            phase: target,
        };
        tracing::debug!(project = %project_id, phase = %target, station = %station.name(), "invoking station");
        let outcome = station.run(&ctx).await;

        match outcome.verdict {
            Verdict::Pass => self.commit(project_id, state, target, AuditStatus::Ok, gate, outcome.detail),
            Verdict::Pending => {
                tracing::info!(project = %project_id, phase = %target, "station pending");
                Ok(TransitionOutcome::Pending {
                    phase: target,
                    detail: outcome.detail,
                })
            }
            Verdict::Fail => {
                let reason = outcome
                    .detail
                    .unwrap_or_else(|| format!("station for {} failed", target));
                match gate {
                    Some(kind) => self.gate_failure(project_id, state, current, target, kind, &reason),
                    None => {
                        self.audit.append(
                            &AuditRecord::new(project_id, current, target, AuditStatus::Failed)
                                .with_detail(reason.clone()),
                        )?;
                        tracing::error!(project = %project_id, phase = %target, reason = %reason, "station failed");
                        Err(DispatchError::ExternalToolFailure {
                            phase: target,
                            message: reason,
                        })
                    }
                }
            }
        }
    }

    fn gate_failure(
        &self,
        project_id: &str,
        mut state: ProjectState,
        current: Phase,
        target: Phase,
        gate: GateKind,
        reason: &str,
    ) -> Result<TransitionOutcome, DispatchError> {
        let escalation = self.halt.record_failure(&mut state, target, current, gate, reason);
        let status = match escalation {
            FailureEscalation::Halted => AuditStatus::Halt,
            FailureEscalation::HardStopped => AuditStatus::HardStop,
        };

        state.project_id = project_id.to_string();
        state.push_history(Phase::Halt, Some(current), status.as_str());
        state.touch();
        self.store.save(project_id, &state)?;
        self.audit.append(
            &AuditRecord::new(project_id, current, target, status).with_detail(reason),
        )?;

        match escalation {
            FailureEscalation::Halted => {
                tracing::warn!(
                    project = %project_id,
                    phase = %target,
                    halt_count = state.halt_count,
                    reason = %reason,
                    "gate failed, project halted"
                );
                Err(DispatchError::RecoverableHalt {
                    phase: target,
                    resume_from: current,
                    halt_count: state.halt_count,
                    reason: reason.to_string(),
                })
            }
            FailureEscalation::HardStopped => {
                tracing::error!(
                    project = %project_id,
                    phase = %target,
                    halt_count = state.halt_count,
                    reason = %reason,
                    "gate failed too often, hard stop"
                );
                Err(Self::hard_stop_error(project_id, &state))
            }
        }
    }

    fn commit(
        &self,
        project_id: &str,
        mut state: ProjectState,
        target: Phase,
        status: AuditStatus,
        gate: Option<GateKind>,
        detail: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        let from = state.phase;
        if let Some(kind) = gate {
            self.halt.record_success(&mut state, kind);
        }
        state.clear_halt();
        state.phase = target;
        state.project_id = project_id.to_string();
        if self.plan.locks(target) {
            state.mode_locked = true;
        }
        state.push_history(target, Some(from), status.as_str());
        state.touch();
        self.store.save(project_id, &state)?;

        let mut record = AuditRecord::new(project_id, from, target, status);
        if let Some(detail) = detail {
            record = record.with_detail(detail);
        }
        self.audit.append(&record)?;

        tracing::info!(project = %project_id, from = %from, to = %target, status = %status, "phase committed");
        Ok(TransitionOutcome::Advanced {
            from,
            to: target,
            resumed: status == AuditStatus::Resume,
        })
    }

    fn unknown_phase(&self, phase: Phase) -> DispatchError {
        DispatchError::UnknownPhase {
            phase: phase.to_string(),
            variant: self.variant.clone(),
        }
    }

    fn hard_stop_error(project_id: &str, state: &ProjectState) -> DispatchError {
        DispatchError::HardStop {
            project_id: project_id.to_string(),
            halt_count: state.halt_count,
        }
    }
}
