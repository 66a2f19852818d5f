//! Prompt construction for each agent stage.
//!
//! Kept in one place so the debate contract between stages (what the critic
//! sees of the draft, what the strategist sees of prior critiques) is easy
//! to audit.

use crate::critique::{CritiqueReport, Severity};
use crate::retrieval::RetrievalResult;
use crate::strategist::Draft;

/// System prompt for the query-reframing call.
pub fn reframe_system() -> String {
    "You help a course assistant search lecture material. Given a student's question that \
     retrieved poor results, produce alternative phrasings that are more likely to match how \
     the course documents describe the topic: expand abbreviations, use standard terminology, \
     and split compound questions."
        .to_string()
}

/// User prompt for the query-reframing call.
pub fn reframe_prompt(query: &str, max_alternatives: usize) -> String {
    format!(
        "The search below returned low-relevance results. Produce up to {} alternative \
         phrasings of it.\n\nOriginal query: {}",
        max_alternatives, query
    )
}

/// System prompt for the strategist.
pub fn strategist_system() -> String {
    "You are the Strategist in a course-assistant debate. Draft an answer to the student's \
     question using ONLY the retrieved course material. Express your reasoning as discrete \
     numbered steps, each with a confidence between 0.0 and 1.0. Do not present claims the \
     sources do not support as certain."
        .to_string()
}

/// User prompt for the strategist. When prior critiques exist, every one at
/// medium severity or above must be addressed, and steps that respond to a
/// critique record its index.
pub fn strategist_prompt(
    question: &str,
    context: &RetrievalResult,
    prior_critiques: Option<&CritiqueReport>,
) -> String {
    let mut out = format!(
        "## Question\n\n{}\n\n## Retrieved course material\n\n{}",
        question,
        format_sources(context)
    );

    if let Some(report) = prior_critiques {
        let must_address = report.at_or_above(Severity::Medium);
        if !must_address.is_empty() {
            out.push_str(&format!(
                "\n\n## Critiques of your previous draft (round {})\n\n\
                 You MUST address every critique listed below. When a reasoning step responds \
                 to a critique, set that step's `addresses_critique` to the critique number.\n\n",
                report.round_number
            ));
            for (i, critique) in must_address.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, critique));
            }
        }
    }

    out
}

/// System prompt for the critic.
pub fn critic_system() -> String {
    "You are the Critic in a course-assistant debate. Review the draft answer strictly \
     against the retrieved course material. Flag every claim not traceable to a source as \
     an `unsupported_claim`. Use `missing_context` when the sources do not contain the \
     information needed. Rate each issue's severity honestly: `critical` for answers that \
     would mislead a student, `low` for polish. Report no issues if the draft is sound."
        .to_string()
}

/// User prompt for the critic.
pub fn critic_prompt(draft: &Draft, context: &RetrievalResult) -> String {
    let mut steps = String::new();
    for step in &draft.reasoning_steps {
        steps.push_str(&format!(
            "{}. (confidence {:.2}) {}\n",
            step.step_number, step.confidence, step.thought
        ));
    }

    format!(
        "## Draft answer (round {})\n\n{}\n\n## Reasoning steps\n\n{}\n\
         ## Retrieved course material\n\n{}\n\n\
         Reference reasoning steps by number in `step_ref` where an issue is attributable.",
        draft.round_number,
        draft.content,
        steps,
        format_sources(context)
    )
}

/// System prompt for the reporter's converged-answer narrative call.
pub fn reporter_system() -> String {
    "You are the Reporter in a course-assistant debate. The debate has converged on a draft \
     answer. Write the student-facing framing: a short introduction, the key takeaways, and \
     any important caveats. Stay faithful to the draft; add nothing new."
        .to_string()
}

/// User prompt for the reporter's converged-answer narrative call.
pub fn reporter_prompt(question: &str, draft: &Draft, critique_history: &[CritiqueReport]) -> String {
    let resolved: usize = critique_history.iter().map(|r| r.critiques.len()).sum();
    format!(
        "## Question\n\n{}\n\n## Accepted draft\n\n{}\n\n\
         The debate ran {} round(s) and worked through {} critique(s).",
        question,
        draft.content,
        critique_history.len(),
        resolved
    )
}

/// Render retrieved sources for inclusion in a prompt.
pub fn format_sources(context: &RetrievalResult) -> String {
    if context.sources.is_empty() {
        return "(no sources retrieved)".to_string();
    }
    let mut out = String::new();
    for (i, source) in context.sources.iter().enumerate() {
        out.push_str(&format!(
            "[{}] ({}, relevance {:.2})\n{}\n\n",
            i + 1,
            source.source_id,
            source.score,
            source.content
        ));
    }
    out
}
