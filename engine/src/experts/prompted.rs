use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{Comment, Direction, ExpertId, ProblemState, Verdict};

use super::catalog::{expand, ExpertProfile};
use super::Expert;
use crate::llm::TextGenerator;
use crate::pool::{render_comments, CommentFilter, CommentPool};

/// What an expert remembers across invocations; never visible to the loop
#[derive(Debug, Default)]
struct ExpertState {
    history: Vec<(u32, Direction, String)>,
}

impl ExpertState {
    fn record(&mut self, round: u32, direction: Direction, content: &str) {
        self.history.push((round, direction, content.to_string()));
    }

    fn last_forward(&self) -> Option<&str> {
        self.history
            .iter()
            .rev()
            .find(|(_, d, _)| *d == Direction::Forward)
            .map(|(_, _, c)| c.as_str())
    }
}

/// Expert driven by a role description and task templates
pub struct PromptedExpert {
    id: ExpertId,
    profile: ExpertProfile,
    generator: TextGenerator,
    state: ExpertState,
}

impl PromptedExpert {
    pub fn new(profile: &ExpertProfile, generator: TextGenerator) -> Self {
        Self {
            id: ExpertId::new(profile.id),
            profile: *profile,
            generator,
            state: ExpertState::default(),
        }
    }

    fn template_text(problem: &ProblemState) -> &str {
        problem
            .code_template
            .as_deref()
            .unwrap_or("(no starter code provided)")
    }
}

fn or_none(text: String) -> String {
    if text.is_empty() {
        "(none)".to_string()
    } else {
        text
    }
}

#[async_trait]
impl Expert for PromptedExpert {
    fn id(&self) -> &ExpertId {
        &self.id
    }

    fn name(&self) -> &str {
        self.profile.name
    }

    fn description(&self) -> &str {
        self.profile.description
    }

    async fn forward(
        &mut self,
        problem: &ProblemState,
        pool: &CommentPool,
        round: u32,
    ) -> Result<Comment, EngineError> {
        let comments = or_none(pool.render(&CommentFilter::all().up_to_round(round)));
        let prompt = expand(
            self.profile.forward_task,
            &[
                ("comments", comments.as_str()),
                ("code_template", Self::template_text(problem)),
                ("problem", problem.description.as_str()),
            ],
        );

        tracing::debug!(expert = %self.id, round, prompt_chars = prompt.len(), "forward");
        let content = self.generator.generate(self.profile.role, &prompt).await?;

        self.state.record(round, Direction::Forward, &content);
        Ok(Comment::forward(self.id.clone(), round, content))
    }

    async fn backward(
        &mut self,
        problem: &ProblemState,
        pool: &CommentPool,
        verdict: &Verdict,
        round: u32,
    ) -> Result<Comment, EngineError> {
        let Some(task) = self.profile.backward_task else {
            let previous = self.state.last_forward().unwrap_or("");
            let content = format!("No revision. Earlier contribution stands:\n{}", previous);
            self.state.record(round, Direction::Backward, &content);
            return Ok(Comment::backward(self.id.clone(), round, content));
        };

        let previous = or_none(render_comments(
            pool.query(
                &CommentFilter::all()
                    .by_author(&self.id)
                    .direction(Direction::Forward),
            ),
        ));
        let comments = or_none(pool.render(&CommentFilter::all().up_to_round(round)));
        let feedback = verdict.feedback();
        let prompt = expand(
            task,
            &[
                ("comments", comments.as_str()),
                ("feedback", feedback.as_str()),
                ("previous", previous.as_str()),
                ("code_template", Self::template_text(problem)),
                ("problem", problem.description.as_str()),
            ],
        );

        tracing::debug!(expert = %self.id, round, prompt_chars = prompt.len(), "backward");
        let content = self.generator.generate(self.profile.role, &prompt).await?;

        self.state.record(round, Direction::Backward, &content);
        Ok(Comment::backward(self.id.clone(), round, content))
    }
}
