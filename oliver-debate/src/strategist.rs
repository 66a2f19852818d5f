//! Strategist agent — produces a draft answer with explicit reasoning steps.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::critique::CritiqueReport;
use crate::error::DebateError;
use crate::llm::LlmClient;
use crate::prompts;
use crate::retrieval::RetrievalResult;

/// One discrete reasoning step in a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    /// Step number, 1-based.
    pub step_number: u32,
    /// The reasoning at this step.
    pub thought: String,
    /// Confidence in this step, `[0, 1]`.
    pub confidence: f64,
    /// Prior-round critique (1-based index into the must-address list)
    /// this step responds to, when revising.
    pub addresses_critique: Option<u32>,
}

/// Strategist output for one round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    /// Unique draft identifier.
    pub draft_id: String,
    /// Round this draft belongs to (1-based).
    pub round_number: u32,
    /// The drafted answer text.
    pub content: String,
    /// Ordered reasoning steps.
    pub reasoning_steps: Vec<ReasoningStep>,
}

impl Draft {
    /// Mean step confidence. Derived, never stored independently.
    pub fn average_confidence(&self) -> f64 {
        if self.reasoning_steps.is_empty() {
            return 0.0;
        }
        let total: f64 = self.reasoning_steps.iter().map(|s| s.confidence).sum();
        total / self.reasoning_steps.len() as f64
    }
}

/// LLM response shape for a draft.
#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct DraftResponse {
    /// The drafted answer.
    pub content: String,
    /// Reasoning steps in order.
    pub reasoning_steps: Vec<StepResponse>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct StepResponse {
    /// The reasoning at this step.
    pub thought: String,
    /// Confidence in this step, 0.0 to 1.0.
    pub confidence: f64,
    /// Number of the prior critique this step addresses, if any.
    pub addresses_critique: Option<u32>,
}

/// Drafts answers from retrieved context, revising against prior critiques.
#[derive(Clone)]
pub struct StrategistAgent {
    llm: LlmClient,
}

impl StrategistAgent {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    /// Produce a draft for the round.
    ///
    /// The underlying client retries once with a stricter format
    /// instruction; a second failure surfaces as
    /// [`DebateError::DraftGenerationFailed`], fatal to the round.
    pub async fn draft(
        &self,
        question: &str,
        context: &RetrievalResult,
        prior_critiques: Option<&CritiqueReport>,
        round_number: u32,
    ) -> Result<Draft, DebateError> {
        let response: DraftResponse = self
            .llm
            .complete_structured(
                &prompts::strategist_system(),
                &prompts::strategist_prompt(question, context, prior_critiques),
                0.3,
            )
            .await
            .map_err(|e| DebateError::DraftGenerationFailed(e.to_string()))?;

        if response.content.trim().is_empty() || response.reasoning_steps.is_empty() {
            return Err(DebateError::DraftGenerationFailed(
                "model returned an empty draft".to_string(),
            ));
        }

        let reasoning_steps = response
            .reasoning_steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| ReasoningStep {
                step_number: i as u32 + 1,
                thought: step.thought,
                confidence: step.confidence.clamp(0.0, 1.0),
                addresses_critique: step.addresses_critique,
            })
            .collect();

        let draft = Draft {
            draft_id: Uuid::new_v4().to_string(),
            round_number,
            content: response.content,
            reasoning_steps,
        };
        debug!(
            round_number,
            steps = draft.reasoning_steps.len(),
            average_confidence = draft.average_confidence(),
            "draft produced"
        );
        Ok(draft)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionProvider, CompletionRequest, LlmError};
    use crate::retrieval::QueryType;
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

    fn agent(responses: Vec<Result<Value, LlmError>>) -> StrategistAgent {
        let provider = Arc::new(Scripted {
            responses: Mutex::new(responses.into()),
        });
        StrategistAgent::new(LlmClient::new(provider, 2, Duration::from_secs(5)))
    }

    fn context() -> RetrievalResult {
        RetrievalResult::new("q", QueryType::Original, vec![])
    }

    fn draft_json() -> Value {
        serde_json::json!({
            "content": "The answer.",
            "reasoning_steps": [
                {"thought": "first", "confidence": 0.8},
                {"thought": "second", "confidence": 0.6, "addresses_critique": 1}
            ]
        })
    }

    #[tokio::test]
    async fn test_draft_numbering_and_confidence() {
        let agent = agent(vec![Ok(draft_json())]);
        let draft = agent.draft("q", &context(), None, 1).await.unwrap();

        assert_eq!(draft.round_number, 1);
        assert_eq!(draft.reasoning_steps.len(), 2);
        assert_eq!(draft.reasoning_steps[0].step_number, 1);
        assert_eq!(draft.reasoning_steps[1].step_number, 2);
        assert_eq!(draft.reasoning_steps[1].addresses_critique, Some(1));
        assert!((draft.average_confidence() - 0.7).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_confidence_clamped() {
        let agent = agent(vec![Ok(serde_json::json!({
            "content": "x",
            "reasoning_steps": [{"thought": "t", "confidence": 1.7}]
        }))]);
        let draft = agent.draft("q", &context(), None, 1).await.unwrap();
        assert!((draft.reasoning_steps[0].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_draft_is_failure() {
        let agent = agent(vec![
            Ok(serde_json::json!({"content": "", "reasoning_steps": []})),
        ]);
        let err = agent.draft("q", &context(), None, 1).await.unwrap_err();
        assert!(matches!(err, DebateError::DraftGenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_two_failures_surface_as_draft_generation_failed() {
        let agent = agent(vec![
            Err(LlmError::RequestFailed("one".into())),
            Err(LlmError::RequestFailed("two".into())),
        ]);
        let err = agent.draft("q", &context(), None, 1).await.unwrap_err();
        assert!(matches!(err, DebateError::DraftGenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_recovers_on_retry() {
        let agent = agent(vec![
            Ok(serde_json::json!({"not": "a draft"})),
            Ok(draft_json()),
        ]);
        let draft = agent.draft("q", &context(), None, 2).await.unwrap();
        assert_eq!(draft.round_number, 2);
    }

    #[test]
    fn test_average_confidence_empty() {
        let draft = Draft {
            draft_id: "d".to_string(),
            round_number: 1,
            content: "c".to_string(),
            reasoning_steps: vec![],
        };
        assert_eq!(draft.average_confidence(), 0.0);
    }
}
