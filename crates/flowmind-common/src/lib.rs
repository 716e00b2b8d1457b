//! Shared domain types for the FlowMind dispatcher.

pub mod audit;
pub mod phase;
pub mod pipeline;
pub mod state;

pub use audit::{AuditRecord, AuditStatus, resume_target};
pub use phase::{Phase, UnknownPhase};
pub use pipeline::{GateKind, PipelinePlan, PipelineVariant, PlanError};
pub use state::{ApprovalStatus, ContentMode, MAX_HISTORY_ENTRIES, PhaseRecord, ProjectState};
