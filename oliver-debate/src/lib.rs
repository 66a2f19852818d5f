//! Speculative multi-agent debate orchestration for course Q&A.
//!
//! A question runs through five specialized agents before an answer leaves
//! the system:
//!
//! ```text
//!   question
//!      |
//!      v
//!  [Retriever] --quality gate failed--> speculative reframing (fan-out + merge)
//!      |
//!      v
//!  [Strategist] ---> draft with reasoning steps
//!      |                                  ^
//!      v                                  | iterate (revise against critiques)
//!  [Critic] ------> typed critique report |
//!      |                                  |
//!      v                                  |
//!  [Moderator] --- converge / iterate ----+
//!      |      \
//!      |       deadlock (round budget exhausted)
//!      v
//!  [Reporter] ----> converged answer | honest deadlock answer
//! ```
//!
//! The moderator is deterministic: given the same critique severities, round
//! number, and configuration it always reaches the same decision, so a
//! debate is reproducible from its transcript. The round budget is a hard
//! liveness guarantee; the only terminal states are convergence and
//! deadlock, and deadlock still yields a structured partial answer.

pub mod api;
pub mod config;
pub mod critic;
pub mod critique;
pub mod error;
pub mod llm;
pub mod moderation;
pub mod orchestrator;
pub mod prompts;
pub mod reporter;
pub mod retrieval;
pub mod state;
pub mod strategist;

pub use api::{run_debate, DebateRequest, DebateResponse, ResponseMetadata};
pub use config::DebateConfig;
pub use critic::CriticAgent;
pub use critique::{Critique, CritiqueReport, CritiqueType, Severity};
pub use error::DebateError;
pub use llm::{CompletionProvider, CompletionRequest, LlmClient, LlmError, OpenAiCompatProvider};
pub use moderation::{Decision, ModerationDecision, Moderator};
pub use orchestrator::{DebateOrchestrator, DebateOutcome};
pub use reporter::{ConvergedAnswer, DeadlockAnswer, FinalAnswer, ReporterAgent};
pub use retrieval::{
    HttpSearchProvider, QueryType, RetrievalAgent, RetrievalResult, SearchError, SearchProvider,
    SourceSnippet,
};
pub use state::{DebatePhase, DebateSession, PhaseTransition, Round, SessionStatus};
pub use strategist::{Draft, ReasoningStep, StrategistAgent};
