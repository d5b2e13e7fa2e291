//! Conductor System
//!
//! Chooses which expert speaks next during a forward pass and when the pass
//! ends. Two policies ship: a fixed declaration-order rotation and a
//! model-driven selector that falls back to the same order whenever its
//! answer cannot be used.

use async_trait::async_trait;
use sdk::types::{ExpertId, ProblemState};

use crate::experts::ExpertDescriptor;
use crate::pool::CommentPool;

pub mod generative;
pub mod round_robin;

pub use generative::GenerativeConductor;
pub use round_robin::RoundRobinConductor;

/// Outcome of one selection step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Expert(ExpertId),
    Stop,
}

/// Limits every conductor honours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConductorPolicy {
    /// Maximum experts invoked per forward pass
    pub max_collaborate_nums: usize,
    /// Whether an expert may be chosen twice in one pass
    pub allow_repeat: bool,
}

impl ConductorPolicy {
    pub fn new(max_collaborate_nums: usize, allow_repeat: bool) -> Self {
        Self {
            max_collaborate_nums,
            allow_repeat,
        }
    }

    pub fn budget_exhausted(&self, invoked_so_far: &[ExpertId]) -> bool {
        invoked_so_far.len() >= self.max_collaborate_nums
    }

    /// Candidates still selectable, in declaration order
    pub fn eligible<'a>(
        &self,
        candidates: &'a [ExpertDescriptor],
        invoked_so_far: &[ExpertId],
    ) -> Vec<&'a ExpertDescriptor> {
        candidates
            .iter()
            .filter(|c| self.allow_repeat || !invoked_so_far.contains(&c.id))
            .collect()
    }
}

/// Expert-selection policy
#[async_trait]
pub trait Conductor: Send + Sync {
    fn name(&self) -> &str;

    fn policy(&self) -> ConductorPolicy;

    /// Pick the next expert for this forward pass, or stop.
    ///
    /// `candidates` is the registry in declaration order; `invoked_so_far`
    /// lists this pass's selections in order.
    async fn select_next(
        &self,
        problem: &ProblemState,
        pool: &CommentPool,
        candidates: &[ExpertDescriptor],
        invoked_so_far: &[ExpertId],
    ) -> Selection;
}

#[cfg(test)]
pub(crate) fn descriptors(ids: &[&str]) -> Vec<ExpertDescriptor> {
    ids.iter()
        .map(|id| ExpertDescriptor {
            id: ExpertId::from(*id),
            name: id.to_string(),
            description: format!("{} things", id),
        })
        .collect()
}
