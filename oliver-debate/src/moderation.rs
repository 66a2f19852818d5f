//! Moderator — the sole decision point terminating the debate loop.
//!
//! Deterministic given `(severity_score, round_number, max_rounds,
//! threshold)`: no model call, no hidden state, so every loop outcome is
//! reproducible in tests.

use serde::{Deserialize, Serialize};

use crate::critique::CritiqueReport;

/// Terminal-or-continue decision for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Accept the current draft.
    Converged,
    /// Run another round.
    Iterate,
    /// Round budget exhausted without convergence.
    Deadlock,
}

impl Decision {
    /// Whether this decision ends the debate.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Iterate)
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::Iterate => write!(f, "iterate"),
            Self::Deadlock => write!(f, "deadlock"),
        }
    }
}

/// Moderator output for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationDecision {
    /// The decision.
    pub decision: Decision,
    /// `1 - severity_score` of the round's critique report.
    pub convergence_score: f64,
    /// Why the decision was taken.
    pub reasoning: String,
}

impl ModerationDecision {
    /// Decision forced by a fatal stage failure, bypassing remaining rounds.
    pub fn forced_deadlock(reason: &str) -> Self {
        Self {
            decision: Decision::Deadlock,
            convergence_score: 0.0,
            reasoning: format!("forced deadlock: {}", reason),
        }
    }
}

/// Aggregates critique severity into a convergence decision.
#[derive(Debug, Clone)]
pub struct Moderator {
    convergence_threshold: f64,
}

impl Moderator {
    /// Create a moderator with an inclusive convergence threshold.
    pub fn new(convergence_threshold: f64) -> Self {
        Self {
            convergence_threshold,
        }
    }

    /// Decide whether the debate converges, iterates, or deadlocks.
    ///
    /// The threshold is an inclusive lower bound: a convergence score equal
    /// to the threshold converges. Deadlock is only reachable at the round
    /// budget.
    pub fn moderate(
        &self,
        report: &CritiqueReport,
        round_number: u32,
        max_rounds: u32,
    ) -> ModerationDecision {
        let severity_score = report.severity_score();
        let convergence_score = 1.0 - severity_score;

        let (decision, reasoning) = if convergence_score >= self.convergence_threshold {
            (
                Decision::Converged,
                format!(
                    "convergence score {:.3} meets threshold {:.3} ({} critiques open)",
                    convergence_score,
                    self.convergence_threshold,
                    report.critiques.len()
                ),
            )
        } else if round_number >= max_rounds {
            (
                Decision::Deadlock,
                format!(
                    "round budget {} exhausted with convergence score {:.3} below threshold {:.3}",
                    max_rounds, convergence_score, self.convergence_threshold
                ),
            )
        } else {
            (
                Decision::Iterate,
                format!(
                    "convergence score {:.3} below threshold {:.3}; {} of {} rounds used",
                    convergence_score, self.convergence_threshold, round_number, max_rounds
                ),
            )
        };

        ModerationDecision {
            decision,
            convergence_score,
            reasoning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::critique::{Critique, CritiqueType, Severity};

    fn report_with(severities: &[Severity]) -> CritiqueReport {
        CritiqueReport {
            round_number: 1,
            critiques: severities
                .iter()
                .map(|&severity| Critique {
                    critique_type: CritiqueType::LogicGap,
                    severity,
                    description: "issue".to_string(),
                    step_ref: None,
                })
                .collect(),
        }
    }

    #[test]
    fn test_clean_report_converges_with_score_one() {
        let moderator = Moderator::new(0.7);
        let decision = moderator.moderate(&CritiqueReport::empty(1), 1, 3);
        assert_eq!(decision.decision, Decision::Converged);
        assert!((decision.convergence_score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_severe_report_iterates_before_budget() {
        let moderator = Moderator::new(0.7);
        let decision = moderator.moderate(&report_with(&[Severity::Critical]), 1, 3);
        assert_eq!(decision.decision, Decision::Iterate);
        assert!(decision.convergence_score < 0.7);
    }

    #[test]
    fn test_deadlock_only_at_round_budget() {
        let moderator = Moderator::new(0.7);
        let report = report_with(&[Severity::Critical, Severity::High]);

        for round in 1..3 {
            let decision = moderator.moderate(&report, round, 3);
            assert_eq!(decision.decision, Decision::Iterate, "round {}", round);
        }
        let decision = moderator.moderate(&report, 3, 3);
        assert_eq!(decision.decision, Decision::Deadlock);
    }

    #[test]
    fn test_converged_implies_score_at_or_above_threshold() {
        let moderator = Moderator::new(0.7);
        // One low critique: severity 0.25, convergence 0.75 >= 0.7
        let decision = moderator.moderate(&report_with(&[Severity::Low]), 2, 3);
        assert_eq!(decision.decision, Decision::Converged);
        assert!(decision.convergence_score >= 0.7);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // One medium critique: severity 0.5, convergence 0.5 == threshold
        let moderator = Moderator::new(0.5);
        let decision = moderator.moderate(&report_with(&[Severity::Medium]), 1, 3);
        assert_eq!(decision.decision, Decision::Converged);
    }

    #[test]
    fn test_convergence_on_final_round_beats_deadlock() {
        let moderator = Moderator::new(0.7);
        let decision = moderator.moderate(&report_with(&[Severity::Low]), 3, 3);
        assert_eq!(decision.decision, Decision::Converged);
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let moderator = Moderator::new(0.7);
        let report = report_with(&[Severity::High, Severity::Low]);
        let first = moderator.moderate(&report, 2, 3);
        for _ in 0..10 {
            let again = moderator.moderate(&report, 2, 3);
            assert_eq!(again.decision, first.decision);
            assert!((again.convergence_score - first.convergence_score).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_forced_deadlock_constructor() {
        let decision = ModerationDecision::forced_deadlock("strategist failed");
        assert_eq!(decision.decision, Decision::Deadlock);
        assert_eq!(decision.convergence_score, 0.0);
        assert!(decision.reasoning.contains("strategist failed"));
    }

    #[test]
    fn test_decision_terminal() {
        assert!(Decision::Converged.is_terminal());
        assert!(Decision::Deadlock.is_terminal());
        assert!(!Decision::Iterate.is_terminal());
    }

    #[test]
    fn test_decision_display_and_serde() {
        assert_eq!(Decision::Converged.to_string(), "converged");
        assert_eq!(Decision::Iterate.to_string(), "iterate");
        assert_eq!(Decision::Deadlock.to_string(), "deadlock");

        let json = serde_json::to_string(&Decision::Deadlock).unwrap();
        assert_eq!(json, "\"deadlock\"");
    }
}
