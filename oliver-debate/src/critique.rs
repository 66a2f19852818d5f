//! Typed critiques and the per-round critique report.
//!
//! Severity drives convergence: the report's weighted severity score is the
//! single input the moderator inverts into a convergence score.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordinal severity of a critique. `Critical > High > Medium > Low`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Weight used in the severity aggregate. Monotonic in ordinal rank.
    pub fn weight(self) -> u32 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
            Self::Critical => 4,
        }
    }

    /// Largest weight across all severities.
    pub fn max_weight() -> u32 {
        Self::Critical.weight()
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Category of a critique. Closed set with a catch-all for categories the
/// model invents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CritiqueType {
    /// Drafted claim not traceable to any retrieved source.
    UnsupportedClaim,
    /// Claim contradicts the retrieved sources.
    FactualError,
    /// The retrieved context lacks information the answer needs.
    MissingContext,
    /// A reasoning step does not follow from the previous ones.
    LogicGap,
    /// The draft does not fully answer the question.
    Incomplete,
    /// Content unrelated to the question.
    Irrelevant,
    /// Anything else.
    #[serde(other)]
    Other,
}

impl CritiqueType {
    /// Whether this critique indicates the retrieved context is lacking,
    /// which makes another retrieval pass worthwhile.
    pub fn implies_context_gap(self) -> bool {
        matches!(self, Self::MissingContext | Self::Incomplete)
    }
}

impl std::fmt::Display for CritiqueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedClaim => write!(f, "unsupported_claim"),
            Self::FactualError => write!(f, "factual_error"),
            Self::MissingContext => write!(f, "missing_context"),
            Self::LogicGap => write!(f, "logic_gap"),
            Self::Incomplete => write!(f, "incomplete"),
            Self::Irrelevant => write!(f, "irrelevant"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One issue found by the critic.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Critique {
    /// Category of the issue.
    pub critique_type: CritiqueType,
    /// Severity of the issue.
    pub severity: Severity,
    /// Description of what is wrong.
    pub description: String,
    /// Reasoning step (1-based) the issue refers to, if attributable.
    pub step_ref: Option<u32>,
}

impl std::fmt::Display for Critique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}][{}] {}", self.severity, self.critique_type, self.description)?;
        if let Some(step) = self.step_ref {
            write!(f, " (step {})", step)?;
        }
        Ok(())
    }
}

/// Critic output for one round: ordered critiques plus derived aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CritiqueReport {
    /// Round this report applies to (1-based).
    pub round_number: u32,
    /// Individual critiques, in the order the critic raised them.
    pub critiques: Vec<Critique>,
}

impl CritiqueReport {
    /// Report with no critiques — the draft is considered clean.
    pub fn empty(round_number: u32) -> Self {
        Self {
            round_number,
            critiques: Vec::new(),
        }
    }

    /// Whether the critic found nothing.
    pub fn is_clean(&self) -> bool {
        self.critiques.is_empty()
    }

    /// Count of critiques per severity level.
    pub fn severity_counts(&self) -> BTreeMap<Severity, usize> {
        let mut counts = BTreeMap::new();
        for critique in &self.critiques {
            *counts.entry(critique.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Weighted severity aggregate in `[0, 1]`.
    ///
    /// Mean critique weight normalized by the maximum weight, so a single
    /// critical critique scores 1.0 while any all-low report scores 0.25 —
    /// higher-severity issues always dominate. An empty report scores 0.
    pub fn severity_score(&self) -> f64 {
        if self.critiques.is_empty() {
            return 0.0;
        }
        let total: u32 = self.critiques.iter().map(|c| c.severity.weight()).sum();
        let denom = Severity::max_weight() * self.critiques.len() as u32;
        f64::from(total) / f64::from(denom)
    }

    /// Whether any critique implies the retrieved context is lacking.
    pub fn has_context_gap(&self) -> bool {
        self.critiques
            .iter()
            .any(|c| c.critique_type.implies_context_gap())
    }

    /// Critiques at or above a severity, strongest first (stable within a
    /// severity level).
    pub fn at_or_above(&self, severity: Severity) -> Vec<&Critique> {
        let mut selected: Vec<&Critique> = self
            .critiques
            .iter()
            .filter(|c| c.severity >= severity)
            .collect();
        selected.sort_by(|a, b| b.severity.cmp(&a.severity));
        selected
    }

    /// Highest severity present, if any.
    pub fn max_severity(&self) -> Option<Severity> {
        self.critiques.iter().map(|c| c.severity).max()
    }
}
