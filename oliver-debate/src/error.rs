//! Error taxonomy for the debate orchestrator.
//!
//! Stage-local failures are translated into forced transitions to the
//! reporting phase rather than surfacing as raw errors: the caller always
//! receives a well-formed final answer except for invalid input or an
//! explicit cancellation.

use thiserror::Error;

/// Errors raised by the debate pipeline.
#[derive(Debug, Error)]
pub enum DebateError {
    /// External search capability errored. Fatal to the session — the
    /// orchestrator routes to a forced-deadlock answer.
    #[error("retrieval capability unavailable: {0}")]
    RetrievalUnavailable(String),

    /// The LLM failed to produce a parseable draft after the retry budget.
    /// Fatal to the round — routes to a forced-deadlock answer.
    #[error("draft generation failed: {0}")]
    DraftGenerationFailed(String),

    /// The LLM failed to produce a parseable critique. Advisory — the
    /// orchestrator treats the round's critique report as empty.
    #[error("critique generation failed: {0}")]
    CritiqueGenerationFailed(String),

    /// A stage exceeded its wall-clock budget. Treated identically to the
    /// stage's fatal condition.
    #[error("stage '{stage}' exceeded its time budget")]
    Timeout { stage: String },

    /// The request failed validation before entering the debate loop.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The session was cancelled by the caller.
    #[error("session cancelled")]
    Cancelled,

    /// Internal state machine misuse.
    #[error("invalid phase transition: {0}")]
    Transition(String),
}

impl DebateError {
    /// Whether this error forces the session into the deadlock reporting
    /// path (as opposed to being returned to the caller directly).
    pub fn forces_deadlock(&self) -> bool {
        matches!(
            self,
            Self::RetrievalUnavailable(_)
                | Self::DraftGenerationFailed(_)
                | Self::Timeout { .. }
        )
    }
}
