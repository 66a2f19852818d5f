//! Debate orchestrator — drives one session through the full pipeline.
//!
//! Owns the only mutable reference to the session state; agents are pure
//! capabilities invoked stage by stage. Every stage runs under the shared
//! cancellation token and both a per-stage and a whole-session deadline.
//! Fatal stage failures do not surface as errors: they escalate into the
//! deadlock reporting path so the caller still gets an honest answer.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::DebateRequest;
use crate::config::DebateConfig;
use crate::critic::CriticAgent;
use crate::critique::CritiqueReport;
use crate::error::DebateError;
use crate::llm::{CompletionProvider, LlmClient};
use crate::moderation::{Decision, ModerationDecision, Moderator};
use crate::reporter::{FinalAnswer, ReporterAgent};
use crate::retrieval::{RetrievalAgent, RetrievalResult, SearchProvider};
use crate::state::{DebatePhase, DebateSession, SessionStatus, TransitionError};
use crate::strategist::StrategistAgent;

/// Everything a finished debate produced.
#[derive(Debug, Clone)]
pub struct DebateOutcome {
    /// The student-facing answer.
    pub answer: FinalAnswer,
    /// Full session state, for audit and debugging.
    pub session: DebateSession,
    /// Rounds actually run.
    pub debate_rounds: u32,
    /// Final convergence score.
    pub convergence_score: f64,
    /// Wall-clock time spent.
    pub processing_time_ms: u64,
}

/// Runs debate sessions. Cheap to clone per session.
#[derive(Clone)]
pub struct DebateOrchestrator {
    config: DebateConfig,
    retrieval: RetrievalAgent,
    strategist: StrategistAgent,
    critic: CriticAgent,
    moderator: Moderator,
    reporter: ReporterAgent,
    cancel: CancellationToken,
}

impl DebateOrchestrator {
    pub fn new(
        search: Arc<dyn SearchProvider>,
        provider: Arc<dyn CompletionProvider>,
        config: DebateConfig,
    ) -> Self {
        let llm = LlmClient::new(provider, config.llm_max_attempts, config.stage_timeout());
        Self {
            retrieval: RetrievalAgent::new(search, llm.clone(), &config),
            strategist: StrategistAgent::new(llm.clone()),
            critic: CriticAgent::new(llm.clone()),
            moderator: Moderator::new(config.convergence_threshold),
            reporter: ReporterAgent::new(llm),
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token cancelling this orchestrator's sessions.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one debate session to completion.
    ///
    /// Returns `Err` only for invalid input, cancellation, or internal
    /// state-machine misuse; every other failure mode produces a deadlock
    /// answer.
    pub async fn run(&self, request: DebateRequest) -> Result<DebateOutcome, DebateError> {
        request.validate()?;
        self.config
            .validate()
            .map_err(DebateError::InvalidRequest)?;

        let started = Instant::now();
        let deadline = started + self.config.session_budget();
        let mut session = DebateSession::new(
            request.session_id,
            &request.course_id,
            &request.query,
            self.config.max_debate_rounds,
        );
        let query = session.original_query.clone();
        info!(
            session_id = %session.session_id,
            course_id = %session.course_id,
            max_rounds = session.max_rounds,
            "debate session started"
        );

        session.transition(DebatePhase::Retrieving, "debate started").map_err(transition_err)?;
        let mut context = match self
            .stage("retrieval", deadline, self.retrieval.retrieve_speculative(&session.course_id, &query))
            .await
            .and_then(|inner| inner)
        {
            Ok(context) => context,
            Err(err) if err.forces_deadlock() => {
                return self.escalate(session, err, started).await;
            }
            Err(err) => return Err(err),
        };

        let decision = loop {
            let prior_critique = session.rounds.last().and_then(|r| r.critique.clone());

            session
                .transition(DebatePhase::Drafting, "context ready")
                .map_err(transition_err)?;
            let round_number = session.current_round;
            if let Some(round) = session.current_round_mut() {
                round.retrievals.push(context.clone());
            }

            let draft = match self
                .stage(
                    "draft",
                    deadline,
                    self.strategist
                        .draft(&query, &context, prior_critique.as_ref(), round_number),
                )
                .await
                .and_then(|inner| inner)
            {
                Ok(draft) => draft,
                Err(err) if err.forces_deadlock() => {
                    return self.escalate(session, err, started).await;
                }
                Err(err) => return Err(err),
            };
            if let Some(round) = session.current_round_mut() {
                round.draft = Some(draft.clone());
            }

            session
                .transition(DebatePhase::Critiquing, "draft ready")
                .map_err(transition_err)?;
            let report = match self
                .stage("critique", deadline, self.critic.critique(&draft, &context))
                .await
            {
                Ok(report) => report,
                // Critique is advisory; a timed-out critic reads as clean.
                Err(DebateError::Timeout { .. }) => {
                    warn!(round_number, "critique stage timed out; treating report as empty");
                    CritiqueReport::empty(round_number)
                }
                Err(err) => return Err(err),
            };
            if let Some(round) = session.current_round_mut() {
                round.critique = Some(report.clone());
            }

            session
                .transition(DebatePhase::Moderating, "critique ready")
                .map_err(transition_err)?;
            let decision = self
                .moderator
                .moderate(&report, round_number, session.max_rounds);
            info!(
                session_id = %session.session_id,
                round_number,
                decision = %decision.decision,
                convergence_score = decision.convergence_score,
                "round moderated"
            );
            if let Some(round) = session.current_round_mut() {
                round.moderation = Some(decision.clone());
            }

            match decision.decision {
                Decision::Converged => {
                    session.status = SessionStatus::Converged;
                    session
                        .transition(DebatePhase::Reporting, "converged")
                        .map_err(transition_err)?;
                    break decision;
                }
                Decision::Deadlock => {
                    session.status = SessionStatus::Deadlock;
                    session
                        .transition(DebatePhase::Reporting, "round budget exhausted")
                        .map_err(transition_err)?;
                    break decision;
                }
                Decision::Iterate => {
                    if report.has_context_gap() {
                        session
                            .transition(DebatePhase::Retrieving, "context gap flagged")
                            .map_err(transition_err)?;
                        match self
                            .stage(
                                "re-retrieval",
                                deadline,
                                self.retrieval.retrieve_speculative(&session.course_id, &query),
                            )
                            .await
                            .and_then(|inner| inner)
                        {
                            Ok(fresh) => {
                                context = RetrievalResult::merge(&[context, fresh]);
                            }
                            Err(DebateError::Cancelled) => return Err(DebateError::Cancelled),
                            // Best-effort: the existing context is still usable.
                            Err(err) => {
                                warn!(error = %err, "re-retrieval failed; keeping existing context");
                            }
                        }
                    }
                }
            }
        };

        let answer = self.reporter.synthesize(&session, &decision).await;
        session
            .transition(DebatePhase::Done, "answer delivered")
            .map_err(transition_err)?;

        Ok(DebateOutcome {
            answer,
            debate_rounds: session.current_round,
            convergence_score: decision.convergence_score,
            processing_time_ms: started.elapsed().as_millis() as u64,
            session,
        })
    }

    /// Route a fatal stage failure to a forced-deadlock answer.
    async fn escalate(
        &self,
        mut session: DebateSession,
        error: DebateError,
        started: Instant,
    ) -> Result<DebateOutcome, DebateError> {
        warn!(
            session_id = %session.session_id,
            phase = %session.phase,
            error = %error,
            "fatal stage failure; escalating to deadlock report"
        );
        session.status = SessionStatus::Deadlock;
        session
            .transition(DebatePhase::Reporting, &format!("fatal failure: {}", error))
            .map_err(transition_err)?;

        let decision = ModerationDecision::forced_deadlock(&error.to_string());
        if let Some(round) = session.current_round_mut() {
            round.moderation = Some(decision.clone());
        }

        let answer = self.reporter.synthesize(&session, &decision).await;
        session
            .transition(DebatePhase::Done, "deadlock reported")
            .map_err(transition_err)?;

        Ok(DebateOutcome {
            answer,
            debate_rounds: session.current_round,
            convergence_score: decision.convergence_score,
            processing_time_ms: started.elapsed().as_millis() as u64,
            session,
        })
    }

    /// Run one stage under cancellation and the tighter of the per-stage and
    /// session deadlines.
    async fn stage<T>(
        &self,
        name: &str,
        deadline: Instant,
        fut: impl Future<Output = T>,
    ) -> Result<T, DebateError> {
        if self.cancel.is_cancelled() {
            return Err(DebateError::Cancelled);
        }
        let remaining = deadline
            .saturating_duration_since(Instant::now())
            .min(self.config.stage_timeout());
        if remaining.is_zero() {
            return Err(DebateError::Timeout {
                stage: name.to_string(),
            });
        }

        tokio::select! {
            _ = self.cancel.cancelled() => Err(DebateError::Cancelled),
            outcome = tokio::time::timeout(remaining, fut) => {
                outcome.map_err(|_| DebateError::Timeout { stage: name.to_string() })
            }
        }
    }
}

fn transition_err(err: TransitionError) -> DebateError {
    DebateError::Transition(err.to_string())
}
