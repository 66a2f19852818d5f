//! Public request/response surface.
//!
//! The orchestrator's [`DebateOutcome`] carries full session state for
//! audit; [`DebateResponse`] is the trimmed, serializable shape handed to
//! callers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::DebateConfig;
use crate::error::DebateError;
use crate::llm::CompletionProvider;
use crate::orchestrator::{DebateOrchestrator, DebateOutcome};
use crate::reporter::FinalAnswer;
use crate::retrieval::SearchProvider;

/// One debate request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRequest {
    /// The student's question.
    pub query: String,
    /// Course whose indexed material to search.
    pub course_id: String,
    /// Caller-supplied session id; generated when absent.
    pub session_id: Option<String>,
}

impl DebateRequest {
    pub fn new(query: &str, course_id: &str) -> Self {
        Self {
            query: query.to_string(),
            course_id: course_id.to_string(),
            session_id: None,
        }
    }

    /// Reject requests the pipeline cannot act on.
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.query.trim().is_empty() {
            return Err(DebateError::InvalidRequest("query is empty".to_string()));
        }
        if self.course_id.trim().is_empty() {
            return Err(DebateError::InvalidRequest("course_id is empty".to_string()));
        }
        Ok(())
    }
}

/// Debate metadata attached to every response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub session_id: String,
    pub debate_rounds: u32,
    pub convergence_score: f64,
    pub processing_time_ms: u64,
}

/// Serializable response for one debate.
///
/// `success` is true whenever the pipeline produced an answer, including an
/// honest deadlock answer; it is about the pipeline, not the convergence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateResponse {
    pub success: bool,
    pub answer: FinalAnswer,
    pub metadata: ResponseMetadata,
}

impl DebateResponse {
    pub fn from_outcome(outcome: &DebateOutcome) -> Self {
        Self {
            success: true,
            answer: outcome.answer.clone(),
            metadata: ResponseMetadata {
                session_id: outcome.session.session_id.clone(),
                debate_rounds: outcome.debate_rounds,
                convergence_score: outcome.convergence_score,
                processing_time_ms: outcome.processing_time_ms,
            },
        }
    }
}

/// Run a single debate end to end with the given capabilities.
pub async fn run_debate(
    request: DebateRequest,
    config: DebateConfig,
    search: Arc<dyn SearchProvider>,
    provider: Arc<dyn CompletionProvider>,
) -> Result<DebateResponse, DebateError> {
    let orchestrator = DebateOrchestrator::new(search, provider, config);
    let outcome = orchestrator.run(request).await?;
    Ok(DebateResponse::from_outcome(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_fields() {
        let mut request = DebateRequest::new("what is a b-tree", "cs-101");
        assert!(request.validate().is_ok());

        request.query = "  ".to_string();
        assert!(matches!(
            request.validate(),
            Err(DebateError::InvalidRequest(_))
        ));

        let request = DebateRequest::new("q", "");
        assert!(matches!(
            request.validate(),
            Err(DebateError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_serde() {
        let json = r#"{"query": "q", "course_id": "cs-101", "session_id": null}"#;
        let request: DebateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.query, "q");
        assert!(request.session_id.is_none());
    }
}
