//! Single-call solvers
//!
//! Both ask the model for a program in one shot and extract the code block.
//! They share the provider stack and the evaluator with the expert loop so
//! results are directly comparable.

use sdk::errors::EngineError;
use sdk::types::{Artifact, ProblemState};

use crate::llm::TextGenerator;
use crate::parsing::extract_code_block;

const ROLE: &str = "You are a Python programmer in the field of operations research and \
                    optimization. Your proficiency in utilizing third-party libraries such as \
                    Gurobi is essential. In addition to your expertise in Gurobi, it would be \
                    great if you could also provide some background in related libraries or \
                    tools, like NumPy, SciPy, or PuLP.";

/// Prompting strategy for a one-shot solve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Baseline {
    /// Problem statement in, program out
    Standard,
    /// Step-by-step analysis before the program, seeded with the starter code
    ChainOfThought,
}

impl Baseline {
    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::ChainOfThought => "cot",
        }
    }

    fn prompt(self, problem: &ProblemState) -> String {
        match self {
            Self::Standard => format!(
                "You are given a specific problem. You aim to develop an efficient Python program \
                 that addresses the given problem.\nNow the origin problem is as follow:\n{}\n\
                 Give your Python code directly.",
                problem.description
            ),
            Self::ChainOfThought => format!(
                "You are given a specific problem. You aim to develop an efficient Python program \
                 that addresses the given problem.\nNow the origin problem is as follow:\n{}\n\
                 Let's analyse the problem step by step, and then give your Python code.\n\
                 Here is a starter code:\n{}",
                problem.description,
                problem.code_template.as_deref().unwrap_or("(none)")
            ),
        }
    }

    /// One generation call, then code extraction.
    ///
    /// A reply without a usable code block yields a degraded artifact rather
    /// than an error.
    pub async fn solve(
        self,
        generator: &TextGenerator,
        problem: &ProblemState,
    ) -> Result<Artifact, EngineError> {
        tracing::info!(problem = %problem.id, baseline = self.name(), "Solving in one pass");
        let raw = generator.generate(ROLE, &self.prompt(problem)).await?;
        match extract_code_block(&raw) {
            Ok(code) => Ok(Artifact::parsed(raw, code, 0)),
            Err(e) => {
                tracing::warn!(problem = %problem.id, "Baseline reply has no usable code: {}", e);
                Ok(Artifact::degraded(raw, e.to_string(), 0))
            }
        }
    }
}
