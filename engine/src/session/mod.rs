//! The trial loop
//!
//! One [`Session`] solves one problem. It owns the comment pool and the
//! experts (and therefore their private state) for its whole lifetime, so
//! independent sessions share nothing mutable and can run side by side.
//!
//! ```text
//! COLLABORATING -> SYNTHESIZING -> EVALUATING -> DONE
//!       ^                               |
//!       +--------- REFLECTING <---------+
//! ```
//!
//! Errors are routed by [`ErrorExt::scope`]: session-scoped errors return
//! `Err` with no artifact, trial-scoped errors end the current trial and
//! move on while budget remains.

use std::sync::Arc;

use sdk::errors::{EngineError, ErrorExt, ErrorReport, ErrorScope};
use sdk::types::{Artifact, ExpertId, Fixture, ProblemState, Verdict, VerdictKind};
use serde::Serialize;

use crate::conductor::{
    Conductor, ConductorPolicy, GenerativeConductor, RoundRobinConductor, Selection,
};
use crate::config::{Config, ConductorKind, SessionConfig};
use crate::evaluator::{Evaluator, FixtureRunner};
use crate::experts::ExpertRegistry;
use crate::llm::TextGenerator;
use crate::pool::CommentPool;
use crate::reducer::{ModelReducer, Reducer};

pub mod state;

pub use state::{Phase, PhaseTracker, Transition, TrialRecord};

/// Budgets for one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub max_collaborate_nums: usize,
    pub max_trials: usize,
    pub enable_reflection: bool,
    pub generate_missing_fixtures: bool,
}

impl SessionOptions {
    pub fn from_config(session: &SessionConfig, generate_missing_fixtures: bool) -> Self {
        Self {
            max_collaborate_nums: session.max_collaborate_nums,
            max_trials: session.max_trials.max(1),
            enable_reflection: session.enable_reflection,
            generate_missing_fixtures,
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The final artifact passed every fixture
    Verified,
    /// An artifact exists but did not pass every fixture
    VerificationFailed,
    /// An artifact exists and was never evaluated
    Unverified,
    /// Every trial failed before producing an artifact
    NoArtifact,
}

impl SessionStatus {
    /// Status of a final artifact and its verdict, if any
    pub fn classify(artifact: Option<&Artifact>, verdict: Option<&Verdict>) -> Self {
        match (artifact, verdict) {
            (None, _) => Self::NoArtifact,
            (Some(_), None) => Self::Unverified,
            (Some(_), Some(v)) if v.kind == VerdictKind::Pass => Self::Verified,
            (Some(_), Some(_)) => Self::VerificationFailed,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verified => write!(f, "verified"),
            Self::VerificationFailed => write!(f, "verification_failed"),
            Self::Unverified => write!(f, "unverified"),
            Self::NoArtifact => write!(f, "no_artifact"),
        }
    }
}

/// Result of a session that was not aborted by a session-level error
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub problem_id: String,
    pub status: SessionStatus,
    /// Last artifact computed
    pub artifact: Option<Artifact>,
    /// Verdict for `artifact`, when it was evaluated
    pub verdict: Option<Verdict>,
    pub transcript: CommentPool,
    pub trials: Vec<TrialRecord>,
    /// Last trial-level error, if any trial was cut short
    pub error: Option<ErrorReport>,
}

impl SessionOutcome {
    pub fn is_verified(&self) -> bool {
        self.status == SessionStatus::Verified
    }
}

/// One problem-solving session
pub struct Session {
    registry: ExpertRegistry,
    conductor: Box<dyn Conductor>,
    reducer: Box<dyn Reducer>,
    evaluator: Option<Evaluator>,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        registry: ExpertRegistry,
        conductor: Box<dyn Conductor>,
        reducer: Box<dyn Reducer>,
        options: SessionOptions,
    ) -> Self {
        Self {
            registry,
            conductor,
            reducer,
            evaluator: None,
            options,
        }
    }

    /// Required when reflection is enabled
    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Standard experts, configured conductor, model reducer and evaluator
    pub fn from_config(
        config: &Config,
        generator: &TextGenerator,
        runner: Arc<dyn FixtureRunner>,
        only_experts: Option<&[ExpertId]>,
    ) -> Result<Self, EngineError> {
        let mut registry = ExpertRegistry::standard(generator);
        if let Some(ids) = only_experts {
            registry = registry.with_only(ids)?;
        }

        let policy = ConductorPolicy::new(
            config.session.max_collaborate_nums,
            config.session.allow_repeat_experts,
        );
        let conductor: Box<dyn Conductor> = match config.session.conductor {
            ConductorKind::RoundRobin => Box::new(RoundRobinConductor::new(policy)),
            ConductorKind::Generative => {
                Box::new(GenerativeConductor::new(generator.clone(), policy))
            }
        };

        let mut evaluator = Evaluator::new(runner);
        if config.evaluator.generate_missing_fixtures {
            evaluator = evaluator.with_generator(generator.clone());
        }

        Ok(Self::new(
            registry,
            conductor,
            Box::new(ModelReducer::new(generator.clone())),
            SessionOptions::from_config(&config.session, config.evaluator.generate_missing_fixtures),
        )
        .with_evaluator(evaluator))
    }

    /// Fixtures to judge artifacts with: the store's, else generated ones.
    async fn resolve_fixtures(&self, problem: &ProblemState) -> Result<Vec<Fixture>, EngineError> {
        if !problem.fixtures.is_empty() {
            return Ok(problem.fixtures.clone());
        }
        let evaluator = self.evaluator.as_ref().ok_or_else(|| {
            EngineError::Config("reflection is enabled but no evaluator is configured".to_string())
        })?;
        if !self.options.generate_missing_fixtures || !evaluator.can_generate_tests() {
            return Err(EngineError::NotFound(format!("problem '{}' has no fixtures", problem.id)));
        }
        match evaluator.generate_tests(problem).await {
            Ok(fixtures) => Ok(fixtures),
            Err(e) => Err(EngineError::NotFound(format!(
                "problem '{}' has no fixtures and none could be generated: {}",
                problem.id, e
            ))),
        }
    }

    /// Whether an aborted or failed trial at `index` may be followed by another
    fn has_budget_after(&self, index: u32) -> bool {
        self.options.enable_reflection && (index as usize) + 1 < self.options.max_trials
    }

    /// Run the loop to DONE.
    ///
    /// # Errors
    /// Session-scoped errors only (`NotFound`, `Config`, `Io`). Trial-level
    /// failures are reported inside the outcome.
    pub async fn run(mut self, problem: &ProblemState) -> Result<SessionOutcome, EngineError> {
        tracing::info!(
            problem = %problem.id,
            experts = self.registry.len(),
            conductor = self.conductor.name(),
            max_collaborate = self.options.max_collaborate_nums,
            max_trials = self.options.max_trials,
            reflection = self.options.enable_reflection,
            "Session started"
        );

        if self.registry.is_empty() {
            return Err(EngineError::Config("no experts registered".to_string()));
        }
        let fixtures = if self.options.enable_reflection {
            self.resolve_fixtures(problem).await?
        } else {
            Vec::new()
        };

        let candidates = self.registry.descriptors();
        let allow_repeat = self.conductor.policy().allow_repeat;
        let mut pool = CommentPool::new();
        let mut tracker = PhaseTracker::new();
        let mut trials: Vec<TrialRecord> = Vec::new();
        let mut last: Option<(Artifact, Option<Verdict>)> = None;
        let mut last_error: Option<ErrorReport> = None;
        let mut index: u32 = 0;

        loop {
            let mut record = TrialRecord::new(index);

            // COLLABORATING
            let mut selected: Vec<ExpertId> = Vec::new();
            let mut failure: Option<EngineError> = None;
            while selected.len() < self.options.max_collaborate_nums {
                let id = match self
                    .conductor
                    .select_next(problem, &pool, &candidates, &selected)
                    .await
                {
                    Selection::Stop => break,
                    Selection::Expert(id) => id,
                };
                if !allow_repeat && selected.contains(&id) {
                    tracing::warn!(expert = %id, "Conductor repeated an expert; ending the pass");
                    break;
                }
                let Some(expert) = self.registry.get_mut(&id) else {
                    tracing::warn!(expert = %id, "Conductor chose an unknown expert; ending the pass");
                    break;
                };

                tracing::info!(trial = index, step = selected.len() + 1, expert = %id, "Consulting expert");
                match expert.forward(problem, &pool, index).await {
                    Ok(comment) => {
                        pool.append(comment);
                        selected.push(id);
                    }
                    Err(e) => {
                        tracing::error!(trial = index, expert = %id, "Forward pass failed: {}", e);
                        failure = Some(e);
                        break;
                    }
                }
            }
            record.selected = selected.clone();

            let artifact = match failure {
                Some(e) => Err(e),
                None => {
                    self.enter(&mut tracker, &mut record, Phase::Synthesizing, "forward pass complete");
                    self.reducer.reduce(problem, &pool, index).await
                }
            };

            let artifact = match artifact {
                Ok(artifact) => artifact,
                Err(e) => {
                    if e.scope() == ErrorScope::Session {
                        return Err(e);
                    }
                    tracing::error!(trial = index, "Trial aborted: {}", e);
                    record.error = Some(e.report());
                    last_error = Some(e.report());
                    if self.has_budget_after(index) {
                        self.enter(&mut tracker, &mut record, Phase::Collaborating, "trial aborted, budget remains");
                        trials.push(record);
                        index += 1;
                        continue;
                    }
                    self.enter(&mut tracker, &mut record, Phase::Done, "trial aborted, budget exhausted");
                    trials.push(record);
                    break;
                }
            };
            record.artifact = Some(artifact.clone());

            if !self.options.enable_reflection {
                last = Some((artifact, None));
                self.enter(&mut tracker, &mut record, Phase::Done, "reflection disabled");
                trials.push(record);
                break;
            }

            // EVALUATING
            self.enter(&mut tracker, &mut record, Phase::Evaluating, "artifact synthesized");
            let evaluator = self.evaluator.as_ref().ok_or_else(|| {
                EngineError::Config("reflection is enabled but no evaluator is configured".to_string())
            })?;
            let verdict = evaluator.evaluate(problem, &artifact, &fixtures).await?;
            record.verdict = Some(verdict.clone());
            last = Some((artifact, Some(verdict.clone())));

            if verdict.is_pass() {
                self.enter(&mut tracker, &mut record, Phase::Done, "verdict PASS");
                trials.push(record);
                break;
            }
            if !self.has_budget_after(index) {
                self.enter(&mut tracker, &mut record, Phase::Done, "trial budget exhausted");
                trials.push(record);
                break;
            }

            // REFLECTING
            self.enter(&mut tracker, &mut record, Phase::Reflecting, format!("verdict {}", verdict.kind));
            let mut revised: Vec<&ExpertId> = Vec::new();
            for id in &selected {
                if revised.contains(&id) {
                    continue;
                }
                revised.push(id);
                let Some(expert) = self.registry.get_mut(id) else {
                    continue;
                };
                match expert.backward(problem, &pool, &verdict, index).await {
                    Ok(comment) => pool.append(comment),
                    Err(e) => {
                        if e.scope() == ErrorScope::Session {
                            return Err(e);
                        }
                        tracing::error!(trial = index, expert = %id, "Backward pass failed: {}", e);
                        record.error = Some(e.report());
                        last_error = Some(e.report());
                        break;
                    }
                }
            }

            self.enter(&mut tracker, &mut record, Phase::Collaborating, "next trial");
            trials.push(record);
            index += 1;
        }

        let (artifact, verdict) = match last {
            Some((artifact, verdict)) => (Some(artifact), verdict),
            None => (None, None),
        };
        let status = SessionStatus::classify(artifact.as_ref(), verdict.as_ref());

        tracing::info!(
            problem = %problem.id,
            status = %status,
            trials = trials.len(),
            comments = pool.len(),
            "Session finished"
        );

        Ok(SessionOutcome {
            problem_id: problem.id.clone(),
            status,
            artifact,
            verdict,
            transcript: pool,
            trials,
            error: last_error,
        })
    }

    /// Move the loop to `to`, recording the transition on the trial
    fn enter(
        &self,
        tracker: &mut PhaseTracker,
        record: &mut TrialRecord,
        to: Phase,
        reason: impl Into<String>,
    ) {
        match tracker.advance(to, record.index, reason) {
            Ok(transition) => record.transitions.push(transition),
            Err(e) => tracing::error!(trial = record.index, "{}", e),
        }
    }
}
