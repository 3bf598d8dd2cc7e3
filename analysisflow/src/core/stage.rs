//! Stage identifiers and their static properties.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::AnalysisError;

/// Whether a stage always runs or is gated behind a user decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Always executed, in fixed order, without a gate.
    Required,
    /// Executed only if the user accepts a prompt after the required stages.
    Optional,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
        }
    }
}

/// One unit of analysis work.
///
/// The set is closed: five required stages followed by two optional ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Market and strategic positioning.
    Strategy,
    /// Competitive landscape.
    Competitors,
    /// Revenue projections.
    Revenue,
    /// Cost structure.
    Cost,
    /// Return on investment.
    Roi,
    /// Business justification plan.
    Justification,
    /// Investor pitch deck.
    Deck,
}

/// Required stages in execution order.
pub const REQUIRED_STAGES: [Stage; 5] = [
    Stage::Strategy,
    Stage::Competitors,
    Stage::Revenue,
    Stage::Cost,
    Stage::Roi,
];

/// Optional stages in the order they are offered.
pub const OPTIONAL_STAGES: [Stage; 2] = [Stage::Justification, Stage::Deck];

/// Title and description shown when offering an optional stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePrompt {
    /// Short question.
    pub title: &'static str,
    /// Longer explanation.
    pub description: &'static str,
}

impl Stage {
    /// Returns every stage, required first.
    #[must_use]
    pub const fn all() -> [Self; 7] {
        [
            Self::Strategy,
            Self::Competitors,
            Self::Revenue,
            Self::Cost,
            Self::Roi,
            Self::Justification,
            Self::Deck,
        ]
    }

    /// Returns the stage kind.
    #[must_use]
    pub const fn kind(self) -> StageKind {
        match self {
            Self::Justification | Self::Deck => StageKind::Optional,
            _ => StageKind::Required,
        }
    }

    /// Returns true for required stages.
    #[must_use]
    pub const fn is_required(self) -> bool {
        matches!(self.kind(), StageKind::Required)
    }

    /// Wire name used in backend URLs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strategy => "strategy",
            Self::Competitors => "competitors",
            Self::Revenue => "revenue",
            Self::Cost => "cost",
            Self::Roi => "roi",
            Self::Justification => "justification",
            Self::Deck => "deck",
        }
    }

    /// Human-readable label for tabs and progress markers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Strategy => "Strategy",
            Self::Competitors => "Competitors",
            Self::Revenue => "Revenue",
            Self::Cost => "Cost",
            Self::Roi => "ROI",
            Self::Justification => "Justification",
            Self::Deck => "Deck",
        }
    }

    /// Earlier stages whose formatted output this stage's analysis builds on.
    #[must_use]
    pub const fn upstream(self) -> &'static [Self] {
        match self {
            Self::Strategy => &[],
            Self::Competitors | Self::Revenue => &[Self::Strategy],
            Self::Cost => &[Self::Strategy, Self::Revenue],
            Self::Roi => &[Self::Strategy, Self::Revenue, Self::Cost],
            Self::Justification | Self::Deck => &REQUIRED_STAGES,
        }
    }

    /// Returns true if this stage's analysis consumes `other`'s output.
    #[must_use]
    pub fn depends_on(self, other: Self) -> bool {
        self.upstream().contains(&other)
    }

    /// Prompt text for optional stages; `None` for required ones.
    #[must_use]
    pub const fn prompt(self) -> Option<StagePrompt> {
        match self {
            Self::Justification => Some(StagePrompt {
                title: "Create Business Justification Plan?",
                description: "Would you like to generate a detailed business justification plan based on the analysis?",
            }),
            Self::Deck => Some(StagePrompt {
                title: "Create Investor Deck?",
                description: "Would you like to generate an investor pitch deck based on the analysis?",
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnalysisError::invalid_input(format!("unknown stage '{s}'")))
    }
}
