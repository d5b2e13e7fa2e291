//! Expert capability interface and registry
//!
//! An expert turns the problem and a read-only view of the transcript into a
//! new comment. Experts never append to the pool themselves; the trial loop
//! does, which keeps the pool single-writer.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{Comment, ExpertId, ProblemState, Verdict};
use serde::Serialize;

use crate::llm::TextGenerator;
use crate::pool::CommentPool;

pub mod catalog;
pub mod prompted;

pub use prompted::PromptedExpert;

/// A specialised text-generation agent
#[async_trait]
pub trait Expert: Send + Sync {
    fn id(&self) -> &ExpertId;

    /// Human-readable name
    fn name(&self) -> &str;

    /// What this expert contributes; shown to the conductor
    fn description(&self) -> &str;

    /// Contribute a FORWARD comment for `round`.
    ///
    /// `pool` is the transcript as it exists at the moment of the call.
    async fn forward(
        &mut self,
        problem: &ProblemState,
        pool: &CommentPool,
        round: u32,
    ) -> Result<Comment, EngineError>;

    /// Revise earlier contributions given a non-passing verdict; returns a
    /// BACKWARD comment for `round`.
    async fn backward(
        &mut self,
        problem: &ProblemState,
        pool: &CommentPool,
        verdict: &Verdict,
        round: u32,
    ) -> Result<Comment, EngineError>;
}

/// Public facts about a registered expert
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpertDescriptor {
    pub id: ExpertId,
    pub name: String,
    pub description: String,
}

/// Experts keyed by identity, kept in declaration order
pub struct ExpertRegistry {
    experts: Vec<Box<dyn Expert>>,
}

impl ExpertRegistry {
    /// Build a registry; later duplicates of an identity are rejected
    pub fn new(experts: Vec<Box<dyn Expert>>) -> Result<Self, EngineError> {
        let mut seen: Vec<&ExpertId> = Vec::with_capacity(experts.len());
        for expert in &experts {
            if seen.contains(&expert.id()) {
                return Err(EngineError::Config(format!(
                    "Expert '{}' registered twice",
                    expert.id()
                )));
            }
            seen.push(expert.id());
        }
        Ok(Self { experts })
    }

    /// The built-in catalog, in its declaration order
    pub fn standard(generator: &TextGenerator) -> Self {
        Self {
            experts: catalog::CATALOG
                .iter()
                .map(|profile| {
                    Box::new(PromptedExpert::new(profile, generator.clone())) as Box<dyn Expert>
                })
                .collect(),
        }
    }

    /// Keep only the named experts, preserving declaration order
    pub fn with_only(self, ids: &[ExpertId]) -> Result<Self, EngineError> {
        if let Some(unknown) = ids.iter().find(|id| self.get(id).is_none()) {
            return Err(EngineError::Config(format!("Unknown expert '{}'", unknown)));
        }
        Ok(Self {
            experts: self
                .experts
                .into_iter()
                .filter(|e| ids.contains(e.id()))
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.experts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experts.is_empty()
    }

    pub fn ids(&self) -> Vec<ExpertId> {
        self.experts.iter().map(|e| e.id().clone()).collect()
    }

    pub fn descriptors(&self) -> Vec<ExpertDescriptor> {
        self.experts
            .iter()
            .map(|e| ExpertDescriptor {
                id: e.id().clone(),
                name: e.name().to_string(),
                description: e.description().to_string(),
            })
            .collect()
    }

    pub fn get(&self, id: &ExpertId) -> Option<&dyn Expert> {
        self.experts
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, id: &ExpertId) -> Option<&mut (dyn Expert + 'static)> {
        self.experts
            .iter_mut()
            .find(|e| e.id() == id)
            .map(|e| e.as_mut())
    }
}
