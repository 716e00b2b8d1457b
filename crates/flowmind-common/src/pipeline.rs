//! Pipeline plans: the ordered phase list and gate predicates of one variant.
//!
//! Each pipeline variant is a configuration value rather than code. The
//! transition engine only ever asks a plan questions ("what follows X?",
//! "does entering Y need an external check?"), so adding a variant never
//! touches the state machine.

use crate::Phase;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of external validation a gated phase requires before it can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateKind {
    /// Media QA. Success sets `qa_passed`, failure clears it.
    Qa,
    /// Intermediate artifact check with no side effect on `qa_passed`.
    Check,
    /// Human approval (Telegram or manual verdict).
    Approval,
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateKind::Qa => write!(f, "qa"),
            GateKind::Check => write!(f, "check"),
            GateKind::Approval => write!(f, "approval"),
        }
    }
}

/// Named built-in variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineVariant {
    /// TOPIC through UPLOAD, one QA gate.
    Simple,
    /// The full cashflow pipeline ending in ARCHIVED.
    #[default]
    Production,
    /// Assembly then delivery QA.
    Delivery,
    /// Plan declared in `flowmind.toml`.
    Custom,
}

impl std::fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineVariant::Simple => write!(f, "simple"),
            PipelineVariant::Production => write!(f, "production"),
            PipelineVariant::Delivery => write!(f, "delivery"),
            PipelineVariant::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for PipelineVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simple" => Ok(PipelineVariant::Simple),
            "production" => Ok(PipelineVariant::Production),
            "delivery" => Ok(PipelineVariant::Delivery),
            "custom" => Ok(PipelineVariant::Custom),
            _ => Err(format!(
                "Invalid pipeline variant '{}'. Valid values: simple, production, delivery, custom",
                s
            )),
        }
    }
}

/// Reasons a plan is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Pipeline plan has no phases")]
    Empty,

    #[error("Phase {0} appears more than once in the pipeline plan")]
    Duplicate(Phase),

    #[error("{section} references phase {phase}, which is not part of the plan")]
    NotInPlan { section: &'static str, phase: Phase },
}

/// An ordered phase list plus gate predicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelinePlan {
    /// Total order; first is initial, last is terminal.
    pub phases: Vec<Phase>,
    /// Phases that require an external validation to enter.
    #[serde(default)]
    pub gates: BTreeMap<Phase, GateKind>,
    /// Phases that may only be entered once `qa_passed` is true.
    #[serde(default)]
    pub upload_phases: Vec<Phase>,
    /// Phases that forbid rollback once entered.
    #[serde(default)]
    pub lock_phases: Vec<Phase>,
}

impl PipelinePlan {
    /// Build and validate a plan.
    pub fn new(
        phases: Vec<Phase>,
        gates: BTreeMap<Phase, GateKind>,
        upload_phases: Vec<Phase>,
        lock_phases: Vec<Phase>,
    ) -> Result<Self, PlanError> {
        let plan = Self {
            phases,
            gates,
            upload_phases,
            lock_phases,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Built-in plan for a named variant. `Custom` has no built-in plan.
    pub fn for_variant(variant: PipelineVariant) -> Option<Self> {
        match variant {
            PipelineVariant::Simple => Some(Self::simple()),
            PipelineVariant::Production => Some(Self::production()),
            PipelineVariant::Delivery => Some(Self::delivery()),
            PipelineVariant::Custom => None,
        }
    }

    /// TOPIC → SCRIPT → SCENE → VISUAL → THUMBNAIL → QA → UPLOAD → DONE.
    pub fn simple() -> Self {
        Self {
            phases: vec![
                Phase::Topic,
                Phase::Script,
                Phase::Scene,
                Phase::Visual,
                Phase::Thumbnail,
                Phase::Qa,
                Phase::Upload,
                Phase::Done,
            ],
            gates: BTreeMap::from([(Phase::Qa, GateKind::Qa)]),
            upload_phases: vec![Phase::Upload],
            lock_phases: Vec::new(),
        }
    }

    /// The full cashflow pipeline.
    pub fn production() -> Self {
        Self {
            phases: vec![
                Phase::Created,
                Phase::Topic,
                Phase::Script,
                Phase::Scene,
                Phase::ScenesQa,
                Phase::Assets,
                Phase::AssetManifest,
                Phase::StockMock,
                Phase::AssemblyPlan,
                Phase::AudioPlan,
                Phase::AudioRender,
                Phase::AssemblyFromAudio,
                Phase::FinalQa,
                Phase::DeliveryPack,
                Phase::AwaitingApproval,
                Phase::Approved,
                Phase::ReadyForUpload,
                Phase::Archived,
            ],
            gates: BTreeMap::from([
                (Phase::ScenesQa, GateKind::Check),
                (Phase::FinalQa, GateKind::Qa),
                (Phase::Approved, GateKind::Approval),
            ]),
            upload_phases: vec![Phase::ReadyForUpload],
            lock_phases: vec![Phase::AssemblyFromAudio],
        }
    }

    /// CREATED → ASSEMBLY → FINAL_READY → QA_PASSED.
    pub fn delivery() -> Self {
        Self {
            phases: vec![
                Phase::Created,
                Phase::Assembly,
                Phase::FinalReady,
                Phase::QaPassed,
            ],
            gates: BTreeMap::from([(Phase::QaPassed, GateKind::Qa)]),
            upload_phases: Vec::new(),
            lock_phases: vec![Phase::Assembly],
        }
    }

    pub fn validate(&self) -> Result<(), PlanError> {
        if self.phases.is_empty() {
            return Err(PlanError::Empty);
        }
        for (i, phase) in self.phases.iter().enumerate() {
            if self.phases[..i].contains(phase) {
                return Err(PlanError::Duplicate(*phase));
            }
        }
        for phase in self.gates.keys() {
            self.require_member("gates", *phase)?;
        }
        for phase in &self.upload_phases {
            self.require_member("upload_phases", *phase)?;
        }
        for phase in &self.lock_phases {
            self.require_member("lock_phases", *phase)?;
        }
        Ok(())
    }

    fn require_member(&self, section: &'static str, phase: Phase) -> Result<(), PlanError> {
        if self.contains(phase) {
            Ok(())
        } else {
            Err(PlanError::NotInPlan { section, phase })
        }
    }

    /// The phase a newly created project starts in.
    pub fn initial(&self) -> Phase {
        self.phases[0]
    }

    /// The last phase of the plan (DONE / ARCHIVED style).
    pub fn terminal(&self) -> Phase {
        self.phases[self.phases.len() - 1]
    }

    pub fn contains(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }

    pub fn position(&self, phase: Phase) -> Option<usize> {
        self.phases.iter().position(|p| *p == phase)
    }

    /// The phase immediately following `phase`, or `None` when `phase` is
    /// terminal or not part of the plan.
    pub fn next_after(&self, phase: Phase) -> Option<Phase> {
        let index = self.position(phase)?;
        self.phases.get(index + 1).copied()
    }

    pub fn is_terminal(&self, phase: Phase) -> bool {
        phase == self.terminal()
    }

    pub fn gate(&self, phase: Phase) -> Option<GateKind> {
        self.gates.get(&phase).copied()
    }

    pub fn requires_qa(&self, phase: Phase) -> bool {
        self.upload_phases.contains(&phase)
    }

    pub fn locks(&self, phase: Phase) -> bool {
        self.lock_phases.contains(&phase)
    }

    /// True when `target` sits at or before `current` in the plan order.
    pub fn is_reached(&self, current: Phase, target: Phase) -> bool {
        match (self.position(current), self.position(target)) {
            (Some(c), Some(t)) => t <= c,
            _ => false,
        }
    }
}
