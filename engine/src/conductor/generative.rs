use async_trait::async_trait;
use sdk::types::{ExpertId, ProblemState};

use super::{Conductor, ConductorPolicy, Selection};
use crate::experts::ExpertDescriptor;
use crate::llm::TextGenerator;
use crate::parsing::extract_json_block;
use crate::pool::{CommentFilter, CommentPool};

const ROLE: &str = "You are the conductor of a team of optimization experts. You decide which \
                    expert should contribute next so the team reaches a correct, runnable solution.";

/// Asks the model which expert is needed next.
///
/// Replies that name an ineligible or unknown expert, that cannot be parsed,
/// or that fail to generate at all fall back to the first eligible expert in
/// declaration order. `STOP` is honoured once at least one expert has spoken
/// in the current pass.
pub struct GenerativeConductor {
    generator: TextGenerator,
    policy: ConductorPolicy,
}

impl GenerativeConductor {
    pub fn new(generator: TextGenerator, policy: ConductorPolicy) -> Self {
        Self { generator, policy }
    }

    fn build_prompt(
        problem: &ProblemState,
        pool: &CommentPool,
        eligible: &[&ExpertDescriptor],
        invoked_so_far: &[ExpertId],
    ) -> String {
        let roster = eligible
            .iter()
            .map(|d| format!("- {}: {}", d.id, d.description))
            .collect::<Vec<_>>()
            .join("\n");
        let consulted = if invoked_so_far.is_empty() {
            "(nobody yet)".to_string()
        } else {
            invoked_so_far
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let transcript = pool.render(&CommentFilter::all());

        format!(
            "The problem is:\n{}\n\nComments so far:\n{}\n\nAlready consulted in this round: {}\n\n\
             Experts you can choose from:\n{}\n\n\
             Reply with JSON only: {{\"expert\": \"<id>\"}} naming the expert whose skill is still \
             missing, or {{\"expert\": \"STOP\"}} if the comments already contain everything needed.",
            problem.description,
            if transcript.is_empty() { "(none)" } else { transcript.as_str() },
            consulted,
            roster
        )
    }
}

/// Interpret a conductor reply
fn parse_choice(reply: &str, eligible: &[&ExpertDescriptor]) -> Option<Selection> {
    let named = extract_json_block(reply)
        .ok()
        .and_then(|v| v.get("expert").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| reply.trim().trim_matches(|c| c == '"' || c == '`' || c == '.').to_string());

    if named.eq_ignore_ascii_case("stop") {
        return Some(Selection::Stop);
    }
    eligible
        .iter()
        .find(|d| d.id.as_str() == named)
        .map(|d| Selection::Expert(d.id.clone()))
}

#[async_trait]
impl Conductor for GenerativeConductor {
    fn name(&self) -> &str {
        "generative"
    }

    fn policy(&self) -> ConductorPolicy {
        self.policy
    }

    async fn select_next(
        &self,
        problem: &ProblemState,
        pool: &CommentPool,
        candidates: &[ExpertDescriptor],
        invoked_so_far: &[ExpertId],
    ) -> Selection {
        if self.policy.budget_exhausted(invoked_so_far) {
            return Selection::Stop;
        }
        let eligible = self.policy.eligible(candidates, invoked_so_far);
        let Some(fallback) = eligible.first().map(|d| d.id.clone()) else {
            return Selection::Stop;
        };

        let prompt = Self::build_prompt(problem, pool, &eligible, invoked_so_far);
        let reply = match self.generator.generate(ROLE, &prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!("Conductor generation failed, using declaration order: {}", e);
                return Selection::Expert(fallback);
            }
        };

        match parse_choice(&reply, &eligible) {
            Some(Selection::Stop) if !invoked_so_far.is_empty() => {
                tracing::info!("Conductor stopped the pass after {} experts", invoked_so_far.len());
                Selection::Stop
            }
            Some(Selection::Expert(id)) => Selection::Expert(id),
            _ => {
                tracing::warn!(
                    "Conductor reply not usable, falling back to {}: {:?}",
                    fallback,
                    reply.chars().take(120).collect::<String>()
                );
                Selection::Expert(fallback)
            }
        }
    }
}
