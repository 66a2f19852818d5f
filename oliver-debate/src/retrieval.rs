//! Retrieval agent — course-document search with speculative reframing.
//!
//! Wraps an external search capability behind [`SearchProvider`]. When the
//! initial results fail the quality gate, the agent asks the LLM for
//! alternative phrasings of the query, fans the extra searches out
//! concurrently, and merges everything deterministically by source id.

use async_trait::async_trait;
use futures::future::join_all;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DebateConfig;
use crate::error::DebateError;
use crate::llm::LlmClient;
use crate::prompts;

/// Error from the external search capability.
#[derive(Debug, Error)]
#[error("search backend error: {0}")]
pub struct SearchError(pub String);

/// External retrieval capability (vector search over course documents).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return up to `k` snippets for the query, best first.
    async fn search(
        &self,
        course_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SourceSnippet>, SearchError>;
}

/// One retrieved snippet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnippet {
    /// Document text.
    pub content: String,
    /// Relevance score in `[0, 1]`.
    pub score: f64,
    /// Stable identifier of the source document/chunk.
    pub source_id: String,
}

/// Whether a retrieval used the user's phrasing or a speculative reframing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Original,
    Alternative,
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original => write!(f, "original"),
            Self::Alternative => write!(f, "alternative"),
        }
    }
}

/// Output of one retrieval call (or a deterministic merge of several).
///
/// Invariant: sources are ordered by descending score, ties broken by
/// ascending source id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The query actually issued.
    pub query_used: String,
    /// Whether the query was the original or a reframing.
    pub query_type: QueryType,
    /// Retrieved sources, best first.
    pub sources: Vec<SourceSnippet>,
}

impl RetrievalResult {
    /// Build a result, enforcing the score-descending ordering invariant.
    pub fn new(query_used: &str, query_type: QueryType, mut sources: Vec<SourceSnippet>) -> Self {
        sources.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        Self {
            query_used: query_used.to_string(),
            query_type,
            sources,
        }
    }

    /// Highest relevance score, or 0 when empty.
    pub fn top_score(&self) -> f64 {
        self.sources.first().map(|s| s.score).unwrap_or(0.0)
    }

    /// Whether these results are good enough to draft from.
    pub fn passes_quality_gate(&self, min_relevance: f64, min_sources: usize) -> bool {
        self.sources.len() >= min_sources && self.top_score() >= min_relevance
    }

    /// Merge several results, deduplicating by source id and keeping the
    /// highest score per duplicate.
    ///
    /// Deterministic: the outcome depends only on the input order and
    /// contents, never on network arrival order, and merging the same
    /// source twice is idempotent. The merged query attribution follows
    /// whichever input contributed the top-scoring source.
    pub fn merge(results: &[RetrievalResult]) -> RetrievalResult {
        use std::collections::BTreeMap;

        // source_id -> (snippet, index of contributing result)
        let mut best: BTreeMap<String, (SourceSnippet, usize)> = BTreeMap::new();
        for (idx, result) in results.iter().enumerate() {
            for snippet in &result.sources {
                match best.get(&snippet.source_id) {
                    Some((kept, _)) if kept.score >= snippet.score => {}
                    _ => {
                        best.insert(snippet.source_id.clone(), (snippet.clone(), idx));
                    }
                }
            }
        }

        let top_origin = best
            .values()
            .max_by(|a, b| {
                a.0.score
                    .total_cmp(&b.0.score)
                    .then_with(|| b.0.source_id.cmp(&a.0.source_id))
            })
            .map(|(_, idx)| *idx);

        let (query_used, query_type) = match top_origin.and_then(|idx| results.get(idx)) {
            Some(origin) => (origin.query_used.clone(), origin.query_type),
            None => match results.first() {
                Some(first) => (first.query_used.clone(), first.query_type),
                None => (String::new(), QueryType::Original),
            },
        };

        let sources = best.into_values().map(|(snippet, _)| snippet).collect();
        RetrievalResult::new(&query_used, query_type, sources)
    }
}

/// Response shape for the reframing LLM call.
#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ReframeResponse {
    /// Alternative phrasings of the user's query.
    pub alternatives: Vec<String>,
}

/// Issues retrieval calls and judges result quality.
#[derive(Clone)]
pub struct RetrievalAgent {
    search: Arc<dyn SearchProvider>,
    llm: LlmClient,
    retrieval_k: usize,
    min_relevance: f64,
    min_sources: usize,
    speculation_rounds: usize,
}

impl RetrievalAgent {
    pub fn new(search: Arc<dyn SearchProvider>, llm: LlmClient, config: &DebateConfig) -> Self {
        Self {
            search,
            llm,
            retrieval_k: config.retrieval_k,
            min_relevance: config.min_relevance,
            min_sources: config.min_sources,
            speculation_rounds: config.speculation_rounds,
        }
    }

    /// Retrieve for a single query. Backend errors are fatal to the session.
    pub async fn retrieve(
        &self,
        course_id: &str,
        query: &str,
        query_type: QueryType,
    ) -> Result<RetrievalResult, DebateError> {
        let sources = self
            .search
            .search(course_id, query, self.retrieval_k)
            .await
            .map_err(|e| DebateError::RetrievalUnavailable(e.to_string()))?;
        debug!(query, %query_type, count = sources.len(), "retrieval call completed");
        Ok(RetrievalResult::new(query, query_type, sources))
    }

    /// Retrieve with the quality gate and speculative reframing.
    ///
    /// Proceeds with best-effort context once the reframing budget is
    /// spent, rather than blocking on quality. A failed reframing call is
    /// non-fatal; a failed initial search is.
    pub async fn retrieve_speculative(
        &self,
        course_id: &str,
        query: &str,
    ) -> Result<RetrievalResult, DebateError> {
        let initial = self.retrieve(course_id, query, QueryType::Original).await?;
        if initial.passes_quality_gate(self.min_relevance, self.min_sources) {
            return Ok(initial);
        }

        info!(
            top_score = initial.top_score(),
            sources = initial.sources.len(),
            "quality gate failed; attempting speculative reframing"
        );

        let alternatives = match self.reframe(query).await {
            Ok(alternatives) => alternatives,
            Err(err) => {
                warn!(error = %err, "reframing unavailable; proceeding with initial results");
                return Ok(initial);
            }
        };

        // Fan-out: alternative retrievals are independent of each other.
        let searches = alternatives
            .iter()
            .map(|alt| self.retrieve(course_id, alt, QueryType::Alternative));
        let outcomes = join_all(searches).await;

        let mut collected = vec![initial];
        for (alt, outcome) in alternatives.iter().zip(outcomes) {
            match outcome {
                Ok(result) => collected.push(result),
                // Best-effort: a single failed alternative does not sink
                // the session while the initial call succeeded.
                Err(err) => warn!(query = alt.as_str(), error = %err, "alternative retrieval failed"),
            }
        }

        Ok(RetrievalResult::merge(&collected))
    }

    /// Generate up to `speculation_rounds` alternative phrasings in one
    /// batched LLM call.
    async fn reframe(&self, query: &str) -> Result<Vec<String>, DebateError> {
        let response: ReframeResponse = self
            .llm
            .complete_structured(
                &prompts::reframe_system(),
                &prompts::reframe_prompt(query, self.speculation_rounds),
                0.8,
            )
            .await
            .map_err(|e| DebateError::RetrievalUnavailable(e.to_string()))?;

        let alternatives: Vec<String> = response
            .alternatives
            .into_iter()
            .map(|alt| alt.trim().to_string())
            .filter(|alt| !alt.is_empty() && alt != query)
            .take(self.speculation_rounds)
            .collect();
        Ok(alternatives)
    }
}

/// REST adapter for an external search service.
///
/// POSTs `{course_id, query, k}` and expects a JSON array of
/// `{text, score, source_id}` hits.
pub struct HttpSearchProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    text: String,
    score: f64,
    source_id: String,
}

impl HttpSearchProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SearchProvider for HttpSearchProvider {
    async fn search(
        &self,
        course_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SourceSnippet>, SearchError> {
        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&serde_json::json!({
                "course_id": course_id,
                "query": query,
                "k": k,
            }))
            .send()
            .await
            .map_err(|e| SearchError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError(format!(
                "search API error ({})",
                response.status()
            )));
        }

        let hits: Vec<SearchHit> = response
            .json()
            .await
            .map_err(|e| SearchError(e.to_string()))?;

        Ok(hits
            .into_iter()
            .map(|hit| SourceSnippet {
                content: hit.text,
                score: hit.score,
                source_id: hit.source_id,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(source_id: &str, score: f64) -> SourceSnippet {
        SourceSnippet {
            content: format!("content of {}", source_id),
            score,
            source_id: source_id.to_string(),
        }
    }

    #[test]
    fn test_new_sorts_descending_by_score() {
        let result = RetrievalResult::new(
            "q",
            QueryType::Original,
            vec![snippet("a", 0.3), snippet("b", 0.9), snippet("c", 0.6)],
        );
        let ids: Vec<&str> = result.sources.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert!((result.top_score() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_ties_break_by_source_id() {
        let result = RetrievalResult::new(
            "q",
            QueryType::Original,
            vec![snippet("zeta", 0.5), snippet("alpha", 0.5)],
        );
        assert_eq!(result.sources[0].source_id, "alpha");
    }

    #[test]
    fn test_quality_gate() {
        let good = RetrievalResult::new(
            "q",
            QueryType::Original,
            vec![snippet("a", 0.9), snippet("b", 0.5)],
        );
        assert!(good.passes_quality_gate(0.7, 2));

        let weak_top = RetrievalResult::new(
            "q",
            QueryType::Original,
            vec![snippet("a", 0.5), snippet("b", 0.4)],
        );
        assert!(!weak_top.passes_quality_gate(0.7, 2));

        let too_few = RetrievalResult::new("q", QueryType::Original, vec![snippet("a", 0.9)]);
        assert!(!too_few.passes_quality_gate(0.7, 2));

        let empty = RetrievalResult::new("q", QueryType::Original, vec![]);
        assert!(!empty.passes_quality_gate(0.7, 1));
        assert_eq!(empty.top_score(), 0.0);
    }

    #[test]
    fn test_merge_keeps_highest_score_per_source() {
        let first = RetrievalResult::new(
            "original",
            QueryType::Original,
            vec![snippet("a", 0.4), snippet("b", 0.6)],
        );
        let second = RetrievalResult::new(
            "rephrased",
            QueryType::Alternative,
            vec![snippet("a", 0.8), snippet("c", 0.5)],
        );

        let merged = RetrievalResult::merge(&[first, second]);
        assert_eq!(merged.sources.len(), 3);
        assert_eq!(merged.sources[0].source_id, "a");
        assert!((merged.sources[0].score - 0.8).abs() < f64::EPSILON);
        // Top source came from the alternative query
        assert_eq!(merged.query_type, QueryType::Alternative);
        assert_eq!(merged.query_used, "rephrased");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let result = RetrievalResult::new(
            "q",
            QueryType::Original,
            vec![snippet("a", 0.7), snippet("b", 0.3)],
        );
        let merged = RetrievalResult::merge(&[result.clone(), result.clone()]);
        assert_eq!(merged.sources.len(), 2);
        assert!((merged.sources[0].score - 0.7).abs() < f64::EPSILON);

        let again = RetrievalResult::merge(&[merged.clone()]);
        assert_eq!(again.sources.len(), merged.sources.len());
    }

    #[test]
    fn test_merge_order_independent_of_arrival() {
        let a = RetrievalResult::new(
            "alt-1",
            QueryType::Alternative,
            vec![snippet("x", 0.5), snippet("y", 0.9)],
        );
        let b = RetrievalResult::new(
            "alt-2",
            QueryType::Alternative,
            vec![snippet("x", 0.7), snippet("z", 0.2)],
        );

        let merged_ab = RetrievalResult::merge(&[a.clone(), b.clone()]);
        let merged_ba = RetrievalResult::merge(&[b, a]);
        let ids_ab: Vec<&str> = merged_ab.sources.iter().map(|s| s.source_id.as_str()).collect();
        let ids_ba: Vec<&str> = merged_ba.sources.iter().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids_ab, ids_ba);
        assert_eq!(ids_ab, vec!["y", "x", "z"]);
    }

    #[test]
    fn test_merge_empty_inputs() {
        let merged = RetrievalResult::merge(&[]);
        assert!(merged.sources.is_empty());
        assert_eq!(merged.query_type, QueryType::Original);

        let empty = RetrievalResult::new("q", QueryType::Original, vec![]);
        let merged = RetrievalResult::merge(&[empty]);
        assert!(merged.sources.is_empty());
        assert_eq!(merged.query_used, "q");
    }

    #[test]
    fn test_query_type_display_and_serde() {
        assert_eq!(QueryType::Original.to_string(), "original");
        assert_eq!(QueryType::Alternative.to_string(), "alternative");
        let json = serde_json::to_string(&QueryType::Alternative).unwrap();
        assert_eq!(json, "\"alternative\"");
    }
}
