//! The persisted project state record.
//!
//! `ProjectState` is the explicit allow-list of fields written to
//! `PROJECT_STATE.json`. Anything else found in an existing document is
//! ignored on read and therefore dropped on the next write.

use crate::Phase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of history entries kept inside the state document.
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// Content length mode of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ContentMode {
    Long,
    Short,
}

impl std::fmt::Display for ContentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentMode::Long => write!(f, "LONG"),
            ContentMode::Short => write!(f, "SHORT"),
        }
    }
}

impl std::str::FromStr for ContentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(ContentMode::Long),
            "SHORT" => Ok(ContentMode::Short),
            _ => Err(format!("Invalid mode '{}'. Use LONG or SHORT.", s)),
        }
    }
}

/// Outcome of the human approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "PENDING"),
            ApprovalStatus::Approved => write!(f, "APPROVED"),
            ApprovalStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// One in-state history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRecord {
    #[serde(default = "Utc::now")]
    pub at: DateTime<Utc>,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Phase>,
    /// Empty for entries written by recovery tools that predate statuses.
    #[serde(default)]
    pub status: String,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// The durable state of a single project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: String,
    pub phase: Phase,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_passed: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub halted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halt_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_from: Option<Phase>,
    #[serde(default)]
    pub halt_count: u32,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hard_stop: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub mode_locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ContentMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phase_history: Vec<PhaseRecord>,
}

impl ProjectState {
    /// A fresh state for a project that has never been written.
    pub fn new(project_id: impl Into<String>, initial: Phase) -> Self {
        let now = Utc::now();
        Self {
            project_id: project_id.into(),
            phase: initial,
            created_at: now,
            updated_at: now,
            qa_passed: None,
            halted: false,
            halt_phase: None,
            halt_reason: None,
            resume_from: None,
            halt_count: 0,
            hard_stop: false,
            mode_locked: false,
            mode: None,
            approval_status: None,
            phase_history: Vec::new(),
        }
    }

    /// Append a history entry, keeping only the newest [`MAX_HISTORY_ENTRIES`].
    pub fn push_history(&mut self, phase: Phase, from: Option<Phase>, status: &str) {
        self.phase_history.push(PhaseRecord {
            at: Utc::now(),
            phase,
            from,
            status: status.to_string(),
        });
        if self.phase_history.len() > MAX_HISTORY_ENTRIES {
            let excess = self.phase_history.len() - MAX_HISTORY_ENTRIES;
            self.phase_history.drain(..excess);
        }
    }

    /// Drop every recoverable-halt field. `halt_count` and `hard_stop` are
    /// owned by the halt controller and left alone.
    pub fn clear_halt(&mut self) {
        self.halted = false;
        self.halt_phase = None;
        self.halt_reason = None;
        self.resume_from = None;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
