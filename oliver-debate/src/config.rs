//! Debate configuration.
//!
//! An immutable struct passed into the orchestrator at construction and
//! never mutated mid-session, so concurrent sessions can share nothing.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one debate orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateConfig {
    /// Hard cap on debate rounds (liveness guarantee).
    pub max_debate_rounds: u32,
    /// Number of sources requested per retrieval call.
    pub retrieval_k: usize,
    /// Maximum alternative query phrasings generated during speculative
    /// reframing.
    pub speculation_rounds: usize,
    /// Inclusive lower bound on convergence score for the moderator to
    /// accept a draft.
    pub convergence_threshold: f64,
    /// Minimum top-source relevance for the retrieval quality gate.
    pub min_relevance: f64,
    /// Minimum source count for the retrieval quality gate.
    pub min_sources: usize,
    /// Per-stage wall-clock budget in milliseconds.
    pub stage_timeout_ms: u64,
    /// Attempts per structured LLM call (first try + retries).
    pub llm_max_attempts: u32,
    /// Emit per-stage debug logging.
    pub enable_debug_logging: bool,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_debate_rounds: 3,
            retrieval_k: 5,
            speculation_rounds: 2,
            convergence_threshold: 0.7,
            min_relevance: 0.7,
            min_sources: 2,
            stage_timeout_ms: 60_000,
            llm_max_attempts: 2,
            enable_debug_logging: false,
        }
    }
}

impl DebateConfig {
    /// Read overrides from `OLIVER_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_debate_rounds: env_parse("OLIVER_MAX_ROUNDS", defaults.max_debate_rounds),
            retrieval_k: env_parse("OLIVER_RETRIEVAL_K", defaults.retrieval_k),
            speculation_rounds: env_parse(
                "OLIVER_SPECULATION_ROUNDS",
                defaults.speculation_rounds,
            ),
            convergence_threshold: env_parse(
                "OLIVER_CONVERGENCE_THRESHOLD",
                defaults.convergence_threshold,
            ),
            min_relevance: env_parse("OLIVER_MIN_RELEVANCE", defaults.min_relevance),
            min_sources: env_parse("OLIVER_MIN_SOURCES", defaults.min_sources),
            stage_timeout_ms: env_parse("OLIVER_STAGE_TIMEOUT_MS", defaults.stage_timeout_ms),
            llm_max_attempts: env_parse("OLIVER_LLM_MAX_ATTEMPTS", defaults.llm_max_attempts),
            enable_debug_logging: std::env::var("OLIVER_DEBUG")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(defaults.enable_debug_logging),
        }
    }

    /// Per-stage budget as a [`Duration`].
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_millis(self.stage_timeout_ms)
    }

    /// Session wall-clock budget: three LLM-bound stages per round plus
    /// initial retrieval and reporting.
    pub fn session_budget(&self) -> Duration {
        let stages = u64::from(self.max_debate_rounds) * 3 + 2;
        Duration::from_millis(self.stage_timeout_ms.saturating_mul(stages))
    }

    /// Validate configuration before running a debate.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_debate_rounds == 0 {
            return Err("max_debate_rounds must be at least 1".into());
        }
        if self.retrieval_k == 0 {
            return Err("retrieval_k must be at least 1".into());
        }
        if !(0.0..=1.0).contains(&self.convergence_threshold) {
            return Err("convergence_threshold must be within [0, 1]".into());
        }
        if !(0.0..=1.0).contains(&self.min_relevance) {
            return Err("min_relevance must be within [0, 1]".into());
        }
        if self.llm_max_attempts == 0 {
            return Err("llm_max_attempts must be at least 1".into());
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
