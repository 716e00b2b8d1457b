//! The fixed phase vocabulary shared by every pipeline variant.
//!
//! A project's `phase` field always holds one of these values. Which subset
//! is legal, and in what order, is decided by a [`PipelinePlan`](crate::PipelinePlan).

use serde::{Deserialize, Serialize};

/// A named discrete stage of the production pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Created,
    Topic,
    Script,
    Scene,
    ScenesQa,
    Visual,
    Thumbnail,
    Assets,
    AssetManifest,
    StockMock,
    AssemblyPlan,
    AudioPlan,
    AudioRender,
    AssemblyFromAudio,
    Assembly,
    FinalReady,
    Qa,
    FinalQa,
    DeliveryPack,
    AwaitingApproval,
    Approved,
    ReadyForUpload,
    Upload,
    Archived,
    Done,
    /// Legacy marker written by station runners that park a project on failure.
    Halt,
    QaFailed,
    QaPassed,
}

impl Phase {
    /// Returns every phase in declaration order.
    pub fn all() -> &'static [Phase] {
        &[
            Phase::Created,
            Phase::Topic,
            Phase::Script,
            Phase::Scene,
            Phase::ScenesQa,
            Phase::Visual,
            Phase::Thumbnail,
            Phase::Assets,
            Phase::AssetManifest,
            Phase::StockMock,
            Phase::AssemblyPlan,
            Phase::AudioPlan,
            Phase::AudioRender,
            Phase::AssemblyFromAudio,
            Phase::Assembly,
            Phase::FinalReady,
            Phase::Qa,
            Phase::FinalQa,
            Phase::DeliveryPack,
            Phase::AwaitingApproval,
            Phase::Approved,
            Phase::ReadyForUpload,
            Phase::Upload,
            Phase::Archived,
            Phase::Done,
            Phase::Halt,
            Phase::QaFailed,
            Phase::QaPassed,
        ]
    }

    /// Returns the wire name as stored in `PROJECT_STATE.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Created => "CREATED",
            Phase::Topic => "TOPIC",
            Phase::Script => "SCRIPT",
            Phase::Scene => "SCENE",
            Phase::ScenesQa => "SCENES_QA",
            Phase::Visual => "VISUAL",
            Phase::Thumbnail => "THUMBNAIL",
            Phase::Assets => "ASSETS",
            Phase::AssetManifest => "ASSET_MANIFEST",
            Phase::StockMock => "STOCK_MOCK",
            Phase::AssemblyPlan => "ASSEMBLY_PLAN",
            Phase::AudioPlan => "AUDIO_PLAN",
            Phase::AudioRender => "AUDIO_RENDER",
            Phase::AssemblyFromAudio => "ASSEMBLY_FROM_AUDIO",
            Phase::Assembly => "ASSEMBLY",
            Phase::FinalReady => "FINAL_READY",
            Phase::Qa => "QA",
            Phase::FinalQa => "FINAL_QA",
            Phase::DeliveryPack => "DELIVERY_PACK",
            Phase::AwaitingApproval => "AWAITING_APPROVAL",
            Phase::Approved => "APPROVED",
            Phase::ReadyForUpload => "READY_FOR_UPLOAD",
            Phase::Upload => "UPLOAD",
            Phase::Archived => "ARCHIVED",
            Phase::Done => "DONE",
            Phase::Halt => "HALT",
            Phase::QaFailed => "QA_FAILED",
            Phase::QaPassed => "QA_PASSED",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error returned when a string does not name a phase.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown phase '{0}'")]
pub struct UnknownPhase(pub String);

impl std::str::FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_uppercase().replace('-', "_");
        Phase::all()
            .iter()
            .copied()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}
