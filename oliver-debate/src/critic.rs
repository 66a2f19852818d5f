//! Critic agent — reviews a draft against the retrieved sources.
//!
//! Critique is advisory: if the model fails to produce a parseable report,
//! the round proceeds with an empty one rather than failing.

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::critique::{Critique, CritiqueReport, CritiqueType, Severity};
use crate::llm::LlmClient;
use crate::prompts;
use crate::retrieval::RetrievalResult;
use crate::strategist::Draft;

/// LLM response shape for a critique report.
#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct CritiqueResponse {
    /// Issues found, empty if the draft is sound.
    pub critiques: Vec<CritiqueItemResponse>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct CritiqueItemResponse {
    /// Issue category.
    pub critique_type: CritiqueType,
    /// Issue severity.
    pub severity: Severity,
    /// What is wrong.
    pub description: String,
    /// Reasoning step the issue refers to, if attributable.
    pub step_ref: Option<u32>,
}

/// Reviews drafts for unsupported claims and reasoning flaws.
#[derive(Clone)]
pub struct CriticAgent {
    llm: LlmClient,
}

impl CriticAgent {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Critique a draft against its retrieval context.
    ///
    /// Never fails the round: model errors yield an empty report, logged
    /// at warn level.
    pub async fn critique(&self, draft: &Draft, context: &RetrievalResult) -> CritiqueReport {
        let response: Result<CritiqueResponse, _> = self
            .llm
            .complete_structured(
                &prompts::critic_system(),
                &prompts::critic_prompt(draft, context),
                0.2,
            )
            .await;

        match response {
            Ok(parsed) => {
                let step_count = draft.reasoning_steps.len() as u32;
                let critiques = parsed
                    .critiques
                    .into_iter()
                    .map(|item| Critique {
                        critique_type: item.critique_type,
                        severity: item.severity,
                        description: item.description,
                        // Drop references to steps the draft does not have.
                        step_ref: item
                            .step_ref
                            .filter(|&step| step >= 1 && step <= step_count),
                    })
                    .collect::<Vec<_>>();
                debug!(
                    round_number = draft.round_number,
                    count = critiques.len(),
                    "critique produced"
                );
                CritiqueReport {
                    round_number: draft.round_number,
                    critiques,
                }
            }
            Err(err) => {
                warn!(
                    round_number = draft.round_number,
                    error = %err,
                    "critique generation failed; treating report as empty"
                );
                CritiqueReport::empty(draft.round_number)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionProvider, CompletionRequest, LlmError};
    use crate::retrieval::QueryType;
    use crate::strategist::ReasoningStep;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct Scripted {
        responses: Mutex<VecDeque<Result<Value, LlmError>>>,
    }

    #[async_trait]
    impl CompletionProvider for Scripted {
        async fn complete(&self, _request: &CompletionRequest) -> Result<Value, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::RequestFailed("script exhausted".into())))
        }
    }

    fn agent(responses: Vec<Result<Value, LlmError>>) -> CriticAgent {
        let provider = Arc::new(Scripted {
            responses: Mutex::new(responses.into()),
        });
        CriticAgent::new(LlmClient::new(provider, 2, Duration::from_secs(5)))
    }

    fn draft() -> Draft {
        Draft {
            draft_id: "d-1".to_string(),
            round_number: 1,
            content: "answer".to_string(),
            reasoning_steps: vec![
                ReasoningStep {
                    step_number: 1,
                    thought: "a".to_string(),
                    confidence: 0.8,
                    addresses_critique: None,
                },
                ReasoningStep {
                    step_number: 2,
                    thought: "b".to_string(),
                    confidence: 0.7,
                    addresses_critique: None,
                },
            ],
        }
    }

    fn context() -> RetrievalResult {
        RetrievalResult::new("q", QueryType::Original, vec![])
    }

    #[tokio::test]
    async fn test_critique_parsed() {
        let agent = agent(vec![Ok(serde_json::json!({
            "critiques": [
                {
                    "critique_type": "unsupported_claim",
                    "severity": "high",
                    "description": "claim lacks a source",
                    "step_ref": 2
                }
            ]
        }))]);
        let report = agent.critique(&draft(), &context()).await;
        assert_eq!(report.round_number, 1);
        assert_eq!(report.critiques.len(), 1);
        assert_eq!(report.critiques[0].critique_type, CritiqueType::UnsupportedClaim);
        assert_eq!(report.critiques[0].step_ref, Some(2));
    }

    #[tokio::test]
    async fn test_out_of_range_step_ref_dropped() {
        let agent = agent(vec![Ok(serde_json::json!({
            "critiques": [
                {
                    "critique_type": "logic_gap",
                    "severity": "medium",
                    "description": "refers to a step that does not exist",
                    "step_ref": 9
                }
            ]
        }))]);
        let report = agent.critique(&draft(), &context()).await;
        assert_eq!(report.critiques[0].step_ref, None);
    }

    #[tokio::test]
    async fn test_clean_report() {
        let agent = agent(vec![Ok(serde_json::json!({"critiques": []}))]);
        let report = agent.critique(&draft(), &context()).await;
        assert!(report.is_clean());
        assert_eq!(report.severity_score(), 0.0);
    }

    #[tokio::test]
    async fn test_failure_yields_empty_report() {
        let agent = agent(vec![
            Err(LlmError::RequestFailed("down".into())),
            Err(LlmError::RequestFailed("still down".into())),
        ]);
        let report = agent.critique(&draft(), &context()).await;
        assert!(report.is_clean());
        assert_eq!(report.round_number, 1);
    }

    #[tokio::test]
    async fn test_unknown_category_becomes_other() {
        let agent = agent(vec![Ok(serde_json::json!({
            "critiques": [
                {
                    "critique_type": "novel_invention",
                    "severity": "low",
                    "description": "model made up a category",
                    "step_ref": null
                }
            ]
        }))]);
        let report = agent.critique(&draft(), &context()).await;
        assert_eq!(report.critiques[0].critique_type, CritiqueType::Other);
    }
}
