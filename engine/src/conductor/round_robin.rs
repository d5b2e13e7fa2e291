use async_trait::async_trait;
use sdk::types::{ExpertId, ProblemState};

use super::{Conductor, ConductorPolicy, Selection};
use crate::experts::ExpertDescriptor;
use crate::pool::CommentPool;

/// Declaration-order rotation. Deterministic for identical registries.
pub struct RoundRobinConductor {
    policy: ConductorPolicy,
}

impl RoundRobinConductor {
    pub fn new(policy: ConductorPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Conductor for RoundRobinConductor {
    fn name(&self) -> &str {
        "round_robin"
    }

    fn policy(&self) -> ConductorPolicy {
        self.policy
    }

    async fn select_next(
        &self,
        _problem: &ProblemState,
        _pool: &CommentPool,
        candidates: &[ExpertDescriptor],
        invoked_so_far: &[ExpertId],
    ) -> Selection {
        if candidates.is_empty() || self.policy.budget_exhausted(invoked_so_far) {
            return Selection::Stop;
        }

        if self.policy.allow_repeat {
            let next = &candidates[invoked_so_far.len() % candidates.len()];
            return Selection::Expert(next.id.clone());
        }

        match self.policy.eligible(candidates, invoked_so_far).first() {
            Some(next) => Selection::Expert(next.id.clone()),
            None => Selection::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conductor::descriptors;

    async fn run_pass(conductor: &RoundRobinConductor, candidates: &[ExpertDescriptor]) -> Vec<String> {
        let problem = ProblemState::new("p", "d");
        let pool = CommentPool::new();
        let mut invoked = Vec::new();
        while let Selection::Expert(id) = conductor
            .select_next(&problem, &pool, candidates, &invoked)
            .await
        {
            invoked.push(id);
        }
        invoked.iter().map(|i| i.to_string()).collect()
    }

    #[tokio::test]
    async fn test_budget_limits_pass() {
        let conductor = RoundRobinConductor::new(ConductorPolicy::new(2, false));
        let picked = run_pass(&conductor, &descriptors(&["a", "b", "c"])).await;
        assert_eq!(picked, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stops_when_everyone_spoke() {
        let conductor = RoundRobinConductor::new(ConductorPolicy::new(10, false));
        let picked = run_pass(&conductor, &descriptors(&["a", "b"])).await;
        assert_eq!(picked, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_wraps_when_repeats_allowed() {
        let conductor = RoundRobinConductor::new(ConductorPolicy::new(5, true));
        let picked = run_pass(&conductor, &descriptors(&["a", "b"])).await;
        assert_eq!(picked, vec!["a", "b", "a", "b", "a"]);
    }
}
