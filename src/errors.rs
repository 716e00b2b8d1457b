//! Typed error hierarchy for the dispatcher.
//!
//! Every failure the transition engine, state store or orchestrator can
//! surface is a `DispatchError` variant. The CLI maps each variant to a
//! stable process exit code via [`DispatchError::exit_code`].

use flowmind_common::{Phase, PlanError};
use std::path::PathBuf;
use thiserror::Error;

/// Exit codes shared by the CLI and its wrappers.
pub mod exit {
    pub const OK: i32 = 0;
    pub const GENERIC: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const GATE: i32 = 3;
    pub const IDENTITY: i32 = 4;
    pub const STATE: i32 = 5;
    pub const EXTERNAL_TOOL: i32 = 6;
    pub const LOCKED: i32 = 7;
    pub const RECOVERABLE_HALT: i32 = 10;
    pub const HARD_STOP: i32 = 11;
}

/// Errors from the dispatcher core.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Unknown phase {phase}: not part of the {variant} pipeline")]
    UnknownPhase { phase: String, variant: String },

    #[error("Identity mismatch: folder '{folder}' holds state for project '{project_id}'")]
    IdentityMismatch { folder: String, project_id: String },

    #[error("State file {path} is corrupt: {message}")]
    StateCorrupt { path: PathBuf, message: String },

    #[error("No state found for project {project_id}")]
    StateMissing { project_id: String },

    #[error("Gate not satisfied for {phase}: {reason}")]
    GateNotSatisfied { phase: Phase, reason: String },

    #[error("Rollback forbidden: project is mode-locked at {current}, cannot move to {requested}")]
    RollbackForbidden { current: Phase, requested: Phase },

    #[error("Project {project_id} is halted at {halt_phase}; resume or retry {halt_phase} first")]
    Halted {
        project_id: String,
        halt_phase: Phase,
        resume_from: Option<Phase>,
    },

    #[error("Recoverable halt at {phase} (attempt {halt_count}): {reason}")]
    RecoverableHalt {
        phase: Phase,
        resume_from: Phase,
        halt_count: u32,
        reason: String,
    },

    #[error("Hard stop for project {project_id} after {halt_count} failed attempts; run unlock")]
    HardStop { project_id: String, halt_count: u32 },

    #[error("External tool failed at {phase}: {message}")]
    ExternalToolFailure { phase: Phase, message: String },

    #[error("Orchestrator lock {path} is held by pid {pid}")]
    Locked { path: PathBuf, pid: u32 },

    #[error("Invalid pipeline plan: {0}")]
    Plan(#[from] PlanError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DispatchError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DispatchError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            DispatchError::Usage(_) | DispatchError::UnknownPhase { .. } => exit::USAGE,
            DispatchError::GateNotSatisfied { .. }
            | DispatchError::RollbackForbidden { .. }
            | DispatchError::Halted { .. } => exit::GATE,
            DispatchError::IdentityMismatch { .. } => exit::IDENTITY,
            DispatchError::StateCorrupt { .. } | DispatchError::StateMissing { .. } => exit::STATE,
            DispatchError::ExternalToolFailure { .. } => exit::EXTERNAL_TOOL,
            DispatchError::Locked { .. } => exit::LOCKED,
            DispatchError::RecoverableHalt { .. } => exit::RECOVERABLE_HALT,
            DispatchError::HardStop { .. } => exit::HARD_STOP,
            DispatchError::Plan(_) | DispatchError::Config(_) | DispatchError::Io { .. } => {
                exit::GENERIC
            }
        }
    }
}

/// Exit code for an `anyhow` error that may wrap a `DispatchError`.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<DispatchError>())
        .map(DispatchError::exit_code)
        .unwrap_or(exit::GENERIC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_identity_mismatch_carries_both_names() {
        let err = DispatchError::IdentityMismatch {
            folder: "FM_A".to_string(),
            project_id: "FM_B".to_string(),
        };
        match &err {
            DispatchError::IdentityMismatch { folder, project_id } => {
                assert_eq!(folder, "FM_A");
                assert_eq!(project_id, "FM_B");
            }
            _ => panic!("Expected IdentityMismatch"),
        }
        assert!(err.to_string().contains("FM_A"));
        assert_eq!(err.exit_code(), exit::IDENTITY);
    }

    #[test]
    fn test_exit_codes_follow_taxonomy() {
        let cases = [
            (DispatchError::Usage("x".into()), exit::USAGE),
            (
                DispatchError::UnknownPhase {
                    phase: "PUBLISH".into(),
                    variant: "simple".into(),
                },
                exit::USAGE,
            ),
            (
                DispatchError::GateNotSatisfied {
                    phase: Phase::Upload,
                    reason: "qa".into(),
                },
                exit::GATE,
            ),
            (
                DispatchError::RollbackForbidden {
                    current: Phase::AssemblyFromAudio,
                    requested: Phase::Script,
                },
                exit::GATE,
            ),
            (
                DispatchError::StateMissing {
                    project_id: "FM_1".into(),
                },
                exit::STATE,
            ),
            (
                DispatchError::ExternalToolFailure {
                    phase: Phase::Script,
                    message: "exit 1".into(),
                },
                exit::EXTERNAL_TOOL,
            ),
            (
                DispatchError::Locked {
                    path: PathBuf::from(".orch.lock"),
                    pid: 42,
                },
                exit::LOCKED,
            ),
            (
                DispatchError::RecoverableHalt {
                    phase: Phase::Qa,
                    resume_from: Phase::Thumbnail,
                    halt_count: 1,
                    reason: "bad audio".into(),
                },
                exit::RECOVERABLE_HALT,
            ),
            (
                DispatchError::HardStop {
                    project_id: "FM_1".into(),
                    halt_count: 3,
                },
                exit::HARD_STOP,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{}", err);
        }
    }

    #[test]
    fn test_io_error_is_generic() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = DispatchError::io("/projects/FM_1", io_err);
        match &err {
            DispatchError::Io { path, source } => {
                assert_eq!(path, &PathBuf::from("/projects/FM_1"));
                assert_eq!(source.kind(), std::io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io"),
        }
        assert_eq!(err.exit_code(), exit::GENERIC);
    }

    #[test]
    fn test_exit_code_for_finds_wrapped_error() {
        let result: Result<(), DispatchError> = Err(DispatchError::HardStop {
            project_id: "FM_9".into(),
            halt_count: 3,
        });
        let err = result.context("advance failed").unwrap_err();
        assert_eq!(exit_code_for(&err), exit::HARD_STOP);

        let plain = anyhow::anyhow!("something else");
        assert_eq!(exit_code_for(&plain), exit::GENERIC);
    }
}
