//! Audit records: one line per transition attempt.

use crate::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a transition attempt as recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    Ok,
    Resume,
    Halt,
    HardStop,
    Failed,
    ManualUnlock,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "OK",
            AuditStatus::Resume => "RESUME",
            AuditStatus::Halt => "HALT",
            AuditStatus::HardStop => "HARD_STOP",
            AuditStatus::Failed => "FAILED",
            AuditStatus::ManualUnlock => "MANUAL_UNLOCK",
        }
    }

    /// Halt markers are skipped when computing the resume target.
    pub fn is_halt_marker(&self) -> bool {
        matches!(self, AuditStatus::Halt | AuditStatus::HardStop)
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub project_id: String,
    pub from: Phase,
    pub to: Phase,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl AuditRecord {
    pub fn new(project_id: &str, from: Phase, to: Phase, status: AuditStatus) -> Self {
        Self {
            timestamp: Utc::now(),
            project_id: project_id.to_string(),
            from,
            to,
            status,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// The phase this entry represents in the project's trail: the reached
    /// phase for commits, the `HALT` marker for halts.
    pub fn trail_phase(&self) -> Phase {
        if self.status.is_halt_marker() {
            Phase::Halt
        } else {
            self.to
        }
    }
}

/// Phase to resume from, reconstructed from the audit trail.
///
/// Only meaningful when the newest entry is a halt marker: consecutive halt
/// markers are skipped and the phase of the entry just before them is
/// returned. Failed and unlock entries are not part of the phase trail.
pub fn resume_target(records: &[AuditRecord]) -> Option<Phase> {
    let trail: Vec<&AuditRecord> = records
        .iter()
        .filter(|r| {
            matches!(
                r.status,
                AuditStatus::Ok | AuditStatus::Resume | AuditStatus::Halt | AuditStatus::HardStop
            )
        })
        .collect();

    let last = trail.last()?;
    if !last.status.is_halt_marker() {
        return None;
    }

    trail
        .iter()
        .rev()
        .find(|r| !r.status.is_halt_marker())
        .map(|r| r.trail_phase())
}
