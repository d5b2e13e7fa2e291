//! Solution synthesis
//!
//! The reducer reads the whole transcript, every round in both directions,
//! and asks the model for one program. Extraction failures degrade the
//! artifact instead of failing the trial, so the loop can keep going with the
//! raw text preserved.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{Artifact, ProblemState};

use crate::llm::TextGenerator;
use crate::parsing::extract_code_block;
use crate::pool::{CommentFilter, CommentPool};

/// Turns the transcript into a candidate artifact
#[async_trait]
pub trait Reducer: Send + Sync {
    /// # Errors
    /// `Synthesis` when the pool is empty; `Generation` when the model call fails.
    async fn reduce(
        &self,
        problem: &ProblemState,
        pool: &CommentPool,
        round: u32,
    ) -> Result<Artifact, EngineError>;
}

const ROLE: &str = "You are a senior optimization engineer who consolidates a team's discussion \
                    into one final, runnable Python program.";

/// Reducer backed by a single generation call
pub struct ModelReducer {
    generator: TextGenerator,
}

impl ModelReducer {
    pub fn new(generator: TextGenerator) -> Self {
        Self { generator }
    }

    fn build_prompt(problem: &ProblemState, pool: &CommentPool) -> String {
        let template = problem
            .code_template
            .as_deref()
            .unwrap_or("(no starter code provided; define one function that returns the answer)");

        format!(
            "The problem is:\n{}\n\nThe experts have discussed it as follows:\n{}\n\n\
             Using everything above, write the final Python program. Follow this starter code and \
             keep its function name and signature:\n{}\n\n\
             The function must return the optimal objective value. Put the complete program in a \
             single ```python code block.",
            problem.description,
            pool.render(&CommentFilter::all()),
            template
        )
    }
}

#[async_trait]
impl Reducer for ModelReducer {
    async fn reduce(
        &self,
        problem: &ProblemState,
        pool: &CommentPool,
        round: u32,
    ) -> Result<Artifact, EngineError> {
        if pool.is_empty() {
            return Err(EngineError::Synthesis(format!(
                "no comments to synthesize for {}",
                problem.id
            )));
        }

        let prompt = Self::build_prompt(problem, pool);
        tracing::debug!(problem = %problem.id, round, comments = pool.len(), prompt_chars = prompt.len(), "reduce");

        let raw = self.generator.generate(ROLE, &prompt).await?;

        Ok(match extract_code_block(&raw) {
            Ok(code) => Artifact::parsed(raw, code, round),
            Err(EngineError::Parse { message, .. }) => {
                tracing::warn!(problem = %problem.id, round, "Degraded artifact: {}", message);
                Artifact::degraded(raw, message, round)
            }
            Err(other) => return Err(other),
        })
    }
}
