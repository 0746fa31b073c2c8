//! Workflow stages of copper wire production

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A stage of the production workflow. Each stage keeps its own ledger.
///
/// Ordering follows the workflow, so `Stage::Purchase < Stage::Kacha`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Raw copper purchase
    Purchase,
    /// Kacha (raw rod) processing
    Kacha,
    /// Wire drawing
    Draw,
    /// Finished bare copper ready for insulation
    ReadyCopper,
    /// PVC compound purchase
    PvcPurchase,
    /// Final cable production
    Production,
}

/// Error returned when a stage name cannot be parsed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown stage: {0}")]
pub struct ParseStageError(pub String);

impl Stage {
    /// All stages in workflow order
    pub const ALL: [Stage; 6] = [
        Stage::Purchase,
        Stage::Kacha,
        Stage::Draw,
        Stage::ReadyCopper,
        Stage::PvcPurchase,
        Stage::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Purchase => "purchase",
            Stage::Kacha => "kacha",
            Stage::Draw => "draw",
            Stage::ReadyCopper => "ready_copper",
            Stage::PvcPurchase => "pvc_purchase",
            Stage::Production => "production",
        }
    }

    /// Position of this stage in the workflow, starting at 0
    pub fn position(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }

    /// The stage whose ledger receives quantity returned from this one.
    /// `None` for the terminal stage.
    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.position() + 1).copied()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Purchase => write!(f, "Purchase"),
            Stage::Kacha => write!(f, "Kacha Processing"),
            Stage::Draw => write!(f, "Draw Process"),
            Stage::ReadyCopper => write!(f, "Ready Copper"),
            Stage::PvcPurchase => write!(f, "PVC Purchase"),
            Stage::Production => write!(f, "Production"),
        }
    }
}

impl std::str::FromStr for Stage {
    type Err = ParseStageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ParseStageError(s.to_string()))
    }
}

/// Row of the stage table as published to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInfo {
    pub stage: Stage,
    pub label: String,
    pub position: usize,
    pub next: Option<Stage>,
}

impl From<Stage> for StageInfo {
    fn from(stage: Stage) -> Self {
        Self {
            stage,
            label: stage.to_string(),
            position: stage.position(),
            next: stage.next(),
        }
    }
}
