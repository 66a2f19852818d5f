//! Reporter agent — turns a finished debate into the student-facing answer.
//!
//! The converged path makes at most one LLM call, for narrative framing, and
//! falls back to a deterministic rendering if that call fails. The deadlock
//! path is fully deterministic: a session that deadlocked because the model
//! is misbehaving must not depend on the model to explain itself.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::critique::Severity;
use crate::llm::LlmClient;
use crate::moderation::{Decision, ModerationDecision};
use crate::prompts;
use crate::retrieval::RetrievalResult;
use crate::state::DebateSession;
use crate::strategist::Draft;

/// Reference to a source backing the answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    pub score: f64,
}

/// Debate metadata attached to a converged answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIndicators {
    /// Always `"converged"`: only converged answers carry quality
    /// indicators. Duplicates the top-level discriminant for consumers
    /// that read this block in isolation.
    pub debate_status: String,
    pub rounds_used: u32,
    pub critiques_resolved: usize,
    pub convergence_score: f64,
}

/// Answer delivered when the debate converged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvergedAnswer {
    pub introduction: String,
    /// The accepted draft's reasoning, one entry per step.
    pub step_by_step_solution: Vec<String>,
    pub key_takeaways: Vec<String>,
    pub important_notes: Vec<String>,
    /// Equals the final round's convergence score.
    pub confidence_score: f64,
    pub sources: Vec<SourceRef>,
    pub quality_indicators: QualityIndicators,
}

/// Honest partial answer delivered when the debate deadlocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlockAnswer {
    pub partial_solution: String,
    /// What the debate could not settle. Never empty when critiques exist.
    pub areas_of_uncertainty: Vec<String>,
    pub what_we_can_conclude: Vec<String>,
    pub recommendations_for_further_exploration: Vec<String>,
}

/// Final output of a debate session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "debate_status", rename_all = "snake_case")]
pub enum FinalAnswer {
    Converged(ConvergedAnswer),
    Deadlock(DeadlockAnswer),
}

impl FinalAnswer {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged(_))
    }
}

/// Narrative framing requested from the LLM for converged answers.
#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ConvergedNarrative {
    /// One-paragraph introduction to the answer.
    pub introduction: String,
    /// Key points a student should remember.
    pub key_takeaways: Vec<String>,
    /// Caveats or common pitfalls worth flagging.
    pub important_notes: Vec<String>,
}

/// Synthesizes the final answer from session state.
#[derive(Clone)]
pub struct ReporterAgent {
    llm: LlmClient,
}

impl ReporterAgent {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Produce the final answer for a finished session.
    pub async fn synthesize(
        &self,
        session: &DebateSession,
        decision: &ModerationDecision,
    ) -> FinalAnswer {
        match (decision.decision, session.latest_draft()) {
            (Decision::Converged, Some(draft)) => self.converged(session, decision, draft).await,
            // Converged without a draft cannot happen through the
            // orchestrator; degrade honestly rather than panic.
            _ => Self::deadlock(session, decision),
        }
    }

    async fn converged(
        &self,
        session: &DebateSession,
        decision: &ModerationDecision,
        draft: &Draft,
    ) -> FinalAnswer {
        let history = session.critique_history();
        let critiques_resolved = history.iter().map(|r| r.critiques.len()).sum();
        let owned_history: Vec<_> = history.into_iter().cloned().collect();

        let narrative: ConvergedNarrative = match self
            .llm
            .complete_structured(
                &prompts::reporter_system(),
                &prompts::reporter_prompt(&session.original_query, draft, &owned_history),
                0.4,
            )
            .await
        {
            Ok(narrative) => narrative,
            Err(err) => {
                warn!(error = %err, "narrative generation failed; using deterministic framing");
                ConvergedNarrative {
                    introduction: format!(
                        "Here is the answer to your question: {}",
                        session.original_query
                    ),
                    key_takeaways: vec![draft.content.clone()],
                    important_notes: Vec::new(),
                }
            }
        };

        FinalAnswer::Converged(ConvergedAnswer {
            introduction: narrative.introduction,
            step_by_step_solution: draft
                .reasoning_steps
                .iter()
                .map(|s| s.thought.clone())
                .collect(),
            key_takeaways: narrative.key_takeaways,
            important_notes: narrative.important_notes,
            confidence_score: decision.convergence_score,
            sources: Self::sources(session),
            quality_indicators: QualityIndicators {
                debate_status: "converged".to_string(),
                rounds_used: session.current_round,
                critiques_resolved,
                convergence_score: decision.convergence_score,
            },
        })
    }

    /// Deterministic deadlock answer. No model call.
    fn deadlock(session: &DebateSession, decision: &ModerationDecision) -> FinalAnswer {
        let draft = session.latest_draft();

        let partial_solution = match draft {
            Some(draft) => draft.content.clone(),
            None => format!(
                "The question \"{}\" could not be answered from the available course material.",
                session.original_query
            ),
        };

        let mut areas_of_uncertainty = Vec::new();
        if let Some(report) = session.critique_history().last() {
            let floor = report.max_severity().unwrap_or(Severity::Low);
            // Lead with the strongest unresolved objections.
            for critique in report.at_or_above(floor.min(Severity::Medium)) {
                areas_of_uncertainty.push(critique.description.clone());
            }
            if areas_of_uncertainty.is_empty() {
                areas_of_uncertainty
                    .extend(report.critiques.iter().map(|c| c.description.clone()));
            }
        }
        if areas_of_uncertainty.is_empty() {
            areas_of_uncertainty.push(decision.reasoning.clone());
        }

        let what_we_can_conclude = draft
            .map(|d| {
                d.reasoning_steps
                    .iter()
                    .filter(|s| s.confidence >= 0.7)
                    .map(|s| s.thought.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut recommendations = vec![
            "Ask your instructor or teaching assistant about the unresolved points above."
                .to_string(),
            "Try rephrasing the question with terminology from the course material.".to_string(),
        ];
        let context_gap = session
            .critique_history()
            .last()
            .map(|r| r.has_context_gap())
            .unwrap_or(false);
        if context_gap {
            recommendations.push(
                "The course material indexed for this course may not cover this topic."
                    .to_string(),
            );
        }

        FinalAnswer::Deadlock(DeadlockAnswer {
            partial_solution,
            areas_of_uncertainty,
            what_we_can_conclude,
            recommendations_for_further_exploration: recommendations,
        })
    }

    /// Sources backing the answer: the last round's merged retrieval.
    fn sources(session: &DebateSession) -> Vec<SourceRef> {
        session
            .rounds
            .iter()
            .rev()
            .find(|r| !r.retrievals.is_empty())
            .map(|round| {
                let merged = RetrievalResult::merge(&round.retrievals);
                merged
                    .sources
                    .iter()
                    .map(|s| SourceRef {
                        source_id: s.source_id.clone(),
                        score: s.score,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
