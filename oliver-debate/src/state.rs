//! Debate session state machine.
//!
//! A session moves through a fixed set of phases. Transitions are validated
//! centrally so an orchestrator bug cannot, for example, jump from retrieval
//! straight to moderation. Every transition is recorded with a timestamp and
//! reason for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::critique::CritiqueReport;
use crate::moderation::ModerationDecision;
use crate::retrieval::RetrievalResult;
use crate::strategist::Draft;

/// Phases of a debate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Session created, nothing run yet.
    Init,
    /// Gathering course context, possibly with speculative reframing.
    Retrieving,
    /// Strategist drafting an answer.
    Drafting,
    /// Critic reviewing the draft.
    Critiquing,
    /// Moderator deciding converge / iterate / deadlock.
    Moderating,
    /// Reporter synthesizing the final answer.
    Reporting,
    /// Session finished.
    Done,
}

impl DebatePhase {
    /// Phases this phase may legally transition to.
    ///
    /// `Reporting` is reachable from every working phase because any fatal
    /// stage failure escalates straight to a deadlock report.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Init => &[Self::Retrieving],
            Self::Retrieving => &[Self::Drafting, Self::Reporting],
            Self::Drafting => &[Self::Critiquing, Self::Reporting],
            Self::Critiquing => &[Self::Moderating, Self::Reporting],
            // Moderating -> Retrieving covers the context-gap re-retrieval path.
            Self::Moderating => &[Self::Drafting, Self::Retrieving, Self::Reporting],
            Self::Reporting => &[Self::Done],
            Self::Done => &[],
        }
    }

    /// Whether the phase ends the session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Retrieving => "retrieving",
            Self::Drafting => "drafting",
            Self::Critiquing => "critiquing",
            Self::Moderating => "moderating",
            Self::Reporting => "reporting",
            Self::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Attempted phase transition not allowed by the state machine.
#[derive(Debug, Error)]
#[error("invalid phase transition {from} -> {to}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
}

/// Overall outcome status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Debate still in progress.
    Active,
    /// Draft accepted within the round budget.
    Converged,
    /// Budget exhausted or a fatal stage failure occurred.
    Deadlock,
}

/// One recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub reason: String,
    pub at: DateTime<Utc>,
}

/// Everything produced during one debate round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Round {
    /// 1-based round number.
    pub round_number: u32,
    /// Retrieval results feeding this round, merged order preserved.
    pub retrievals: Vec<RetrievalResult>,
    /// Strategist draft, absent if drafting failed.
    pub draft: Option<Draft>,
    /// Critic report, absent if the round aborted before critique.
    pub critique: Option<CritiqueReport>,
    /// Moderator decision, absent if the round aborted before moderation.
    pub moderation: Option<ModerationDecision>,
    pub started_at: DateTime<Utc>,
}

impl Round {
    pub fn new(round_number: u32) -> Self {
        Self {
            round_number,
            retrievals: Vec::new(),
            draft: None,
            critique: None,
            moderation: None,
            started_at: Utc::now(),
        }
    }
}

/// Full state of one debate session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateSession {
    pub session_id: String,
    pub course_id: String,
    /// The student's question as asked.
    pub original_query: String,
    pub status: SessionStatus,
    pub phase: DebatePhase,
    /// Round currently in progress, 0 before the first draft.
    pub current_round: u32,
    pub max_rounds: u32,
    pub rounds: Vec<Round>,
    /// Audit trail of every phase transition.
    pub transitions: Vec<PhaseTransition>,
    pub created_at: DateTime<Utc>,
}

impl DebateSession {
    pub fn new(session_id: Option<String>, course_id: &str, query: &str, max_rounds: u32) -> Self {
        Self {
            session_id: session_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            course_id: course_id.to_string(),
            original_query: query.to_string(),
            status: SessionStatus::Active,
            phase: DebatePhase::Init,
            current_round: 0,
            max_rounds,
            rounds: Vec::new(),
            transitions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Transition to a new phase, rejecting moves the state machine forbids.
    ///
    /// Entering `Drafting` opens a new round and increments `current_round`.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }

        debug!(
            session_id = %self.session_id,
            from = %self.phase,
            to = %to,
            reason,
            "phase transition"
        );
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            reason: reason.to_string(),
            at: Utc::now(),
        });
        self.phase = to;

        if to == DebatePhase::Drafting {
            self.current_round += 1;
            self.rounds.push(Round::new(self.current_round));
        }
        Ok(())
    }

    /// The round currently in progress.
    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        self.rounds.last_mut()
    }

    /// Most recent draft across all rounds, newest first.
    pub fn latest_draft(&self) -> Option<&Draft> {
        self.rounds.iter().rev().find_map(|r| r.draft.as_ref())
    }

    /// Critique reports in round order.
    pub fn critique_history(&self) -> Vec<&CritiqueReport> {
        self.rounds.iter().filter_map(|r| r.critique.as_ref()).collect()
    }

    /// Convergence score of the last moderated round, 0 if none.
    pub fn final_convergence_score(&self) -> f64 {
        self.rounds
            .iter()
            .rev()
            .find_map(|r| r.moderation.as_ref())
            .map(|m| m.convergence_score)
            .unwrap_or(0.0)
    }
}
