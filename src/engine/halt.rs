//! Consecutive-failure accounting for gated phases.
//!
//! NORMAL → HALTED on a gate failure, HALTED → HARD_STOPPED once the counter
//! reaches the limit. A gate success returns to NORMAL and resets the
//! counter; only a manual unlock leaves HARD_STOPPED.

use flowmind_common::{ApprovalStatus, GateKind, Phase, ProjectState};

pub const DEFAULT_MAX_HALT_ATTEMPTS: u32 = 3;

/// Where a project stands with respect to halts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltStatus {
    Normal,
    Halted {
        halt_phase: Option<Phase>,
        resume_from: Option<Phase>,
        halt_count: u32,
        reason: Option<String>,
    },
    HardStopped {
        halt_count: u32,
    },
}

/// Result of recording a gate failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureEscalation {
    Halted,
    HardStopped,
}

#[derive(Debug, Clone, Copy)]
pub struct HaltController {
    max_attempts: u32,
}

impl Default for HaltController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HALT_ATTEMPTS)
    }
}

impl HaltController {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn status(&self, state: &ProjectState) -> HaltStatus {
        if state.hard_stop {
            HaltStatus::HardStopped {
                halt_count: state.halt_count,
            }
        } else if state.halted || state.phase == Phase::Halt {
            HaltStatus::Halted {
                halt_phase: state.halt_phase,
                resume_from: state.resume_from,
                halt_count: state.halt_count,
                reason: state.halt_reason.clone(),
            }
        } else {
            HaltStatus::Normal
        }
    }

    /// Record a failed attempt to enter `target` from `last_good`.
    pub fn record_failure(
        &self,
        state: &mut ProjectState,
        target: Phase,
        last_good: Phase,
        gate: GateKind,
        reason: &str,
    ) -> FailureEscalation {
        state.halt_count = state.halt_count.saturating_add(1);
        state.halted = true;
        state.halt_phase = Some(target);
        state.resume_from = Some(last_good);
        state.halt_reason = Some(reason.to_string());
        match gate {
            GateKind::Qa => state.qa_passed = Some(false),
            GateKind::Approval => state.approval_status = Some(ApprovalStatus::Rejected),
            GateKind::Check => {}
        }

        if state.halt_count >= self.max_attempts {
            state.hard_stop = true;
            FailureEscalation::HardStopped
        } else {
            FailureEscalation::Halted
        }
    }

    /// Record a passed gate.
    pub fn record_success(&self, state: &mut ProjectState, gate: GateKind) {
        state.halt_count = 0;
        match gate {
            GateKind::Qa => state.qa_passed = Some(true),
            GateKind::Approval => state.approval_status = Some(ApprovalStatus::Approved),
            GateKind::Check => {}
        }
    }

    /// Clear every halt field. Returns false when there was no hard stop to clear.
    pub fn unlock(&self, state: &mut ProjectState) -> bool {
        let was_stopped = state.hard_stop;
        state.hard_stop = false;
        state.halt_count = 0;
        state.clear_halt();
        was_stopped
    }
}
