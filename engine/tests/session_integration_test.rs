//! Integration tests for the trial loop
//!
//! Experts, reducer and fixture runner are scripted so each test controls
//! exactly what every collaborator returns.

use async_trait::async_trait;
use coe_engine::conductor::{ConductorPolicy, RoundRobinConductor};
use coe_engine::evaluator::{Evaluator, FixtureRunner};
use coe_engine::experts::{Expert, ExpertRegistry};
use coe_engine::pool::{CommentFilter, CommentPool};
use coe_engine::reducer::Reducer;
use coe_engine::session::{Phase, Session, SessionOptions, SessionStatus};
use sdk::errors::{EngineError, ErrorKind, GenerationCause};
use sdk::types::{
    Artifact, Comment, Direction, ExpertId, Fixture, FixtureStatus, ProblemState, Verdict,
    VerdictKind,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Every call an expert received, in order
#[derive(Debug, Clone)]
struct Call {
    expert: String,
    direction: Direction,
    round: u32,
    observed: Vec<Comment>,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

struct ScriptedExpert {
    id: ExpertId,
    log: CallLog,
    fail_forward: bool,
    fail_backward: bool,
}

impl ScriptedExpert {
    fn build(id: &str, log: &CallLog, fail_forward: bool, fail_backward: bool) -> Box<dyn Expert> {
        Box::new(Self {
            id: ExpertId::from(id),
            log: Arc::clone(log),
            fail_forward,
            fail_backward,
        })
    }

    fn boxed(id: &str, log: &CallLog) -> Box<dyn Expert> {
        Self::build(id, log, false, false)
    }

    fn failing(id: &str, log: &CallLog) -> Box<dyn Expert> {
        Self::build(id, log, true, false)
    }

    /// Contributes forward, but cannot reflect
    fn stubborn(id: &str, log: &CallLog) -> Box<dyn Expert> {
        Self::build(id, log, false, true)
    }

    fn record(&self, direction: Direction, round: u32, pool: &CommentPool) {
        self.log.lock().unwrap().push(Call {
            expert: self.id.to_string(),
            direction,
            round,
            observed: pool.as_slice().to_vec(),
        });
    }
}

#[async_trait]
impl Expert for ScriptedExpert {
    fn id(&self) -> &ExpertId {
        &self.id
    }

    fn name(&self) -> &str {
        self.id.as_str()
    }

    fn description(&self) -> &str {
        "scripted"
    }

    async fn forward(
        &mut self,
        _problem: &ProblemState,
        pool: &CommentPool,
        round: u32,
    ) -> Result<Comment, EngineError> {
        self.record(Direction::Forward, round, pool);
        if self.fail_forward {
            return Err(EngineError::generation(
                GenerationCause::ServerError,
                "gave up after 3 attempts",
            ));
        }
        Ok(Comment::forward(
            self.id.clone(),
            round,
            format!("{} forward {}", self.id, round),
        ))
    }

    async fn backward(
        &mut self,
        _problem: &ProblemState,
        pool: &CommentPool,
        verdict: &Verdict,
        round: u32,
    ) -> Result<Comment, EngineError> {
        self.record(Direction::Backward, round, pool);
        if self.fail_backward {
            return Err(EngineError::generation(
                GenerationCause::Timeout,
                "no reply after 3 attempts",
            ));
        }
        Ok(Comment::backward(
            self.id.clone(),
            round,
            format!("{} revises after {}", self.id, verdict.kind),
        ))
    }
}

struct CountingReducer {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Reducer for CountingReducer {
    async fn reduce(
        &self,
        problem: &ProblemState,
        pool: &CommentPool,
        round: u32,
    ) -> Result<Artifact, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if pool.is_empty() {
            return Err(EngineError::Synthesis(format!("nothing for {}", problem.id)));
        }
        Ok(Artifact::parsed(
            format!("{} comments", pool.len()),
            format!("def prob_1(case):\n    return {}", round),
            round,
        ))
    }
}

/// Fails on the listed calls (zero-based), otherwise behaves like `CountingReducer`
struct FlakyReducer {
    calls: Arc<AtomicUsize>,
    fail_on: Vec<usize>,
}

#[async_trait]
impl Reducer for FlakyReducer {
    async fn reduce(
        &self,
        _problem: &ProblemState,
        pool: &CommentPool,
        round: u32,
    ) -> Result<Artifact, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&call) {
            return Err(EngineError::Synthesis(format!("model returned nothing on call {}", call)));
        }
        Ok(Artifact::parsed(
            format!("{} comments", pool.len()),
            format!("def prob_1(case):\n    return {}", round),
            round,
        ))
    }
}

/// Returns queued results in order; the last one repeats
struct QueueRunner {
    queue: Mutex<VecDeque<Result<Value, String>>>,
}

impl QueueRunner {
    fn new(results: Vec<Result<Value, String>>) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl FixtureRunner for QueueRunner {
    async fn run(&self, _code: &str, _entry: &str, _input: &Value) -> Result<Value, String> {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }
}

fn problem(fixtures: usize) -> ProblemState {
    let fixtures = (0..fixtures)
        .map(|i| Fixture::new(i.to_string(), json!({ "case": i }), json!(10.0)))
        .collect();
    ProblemState::new("prob_1", "Minimize cost.").with_fixtures(fixtures)
}

fn options(max_collaborate_nums: usize, max_trials: usize, enable_reflection: bool) -> SessionOptions {
    SessionOptions {
        max_collaborate_nums,
        max_trials,
        enable_reflection,
        generate_missing_fixtures: false,
    }
}

fn session(
    experts: Vec<Box<dyn Expert>>,
    opts: SessionOptions,
    reducer_calls: &Arc<AtomicUsize>,
) -> Session {
    Session::new(
        ExpertRegistry::new(experts).unwrap(),
        Box::new(RoundRobinConductor::new(ConductorPolicy::new(
            opts.max_collaborate_nums,
            false,
        ))),
        Box::new(CountingReducer {
            calls: Arc::clone(reducer_calls),
        }),
        opts,
    )
}

fn session_with_flaky_reducer(
    experts: Vec<Box<dyn Expert>>,
    opts: SessionOptions,
    reducer_calls: &Arc<AtomicUsize>,
    fail_on: &[usize],
) -> Session {
    Session::new(
        ExpertRegistry::new(experts).unwrap(),
        Box::new(RoundRobinConductor::new(ConductorPolicy::new(
            opts.max_collaborate_nums,
            false,
        ))),
        Box::new(FlakyReducer {
            calls: Arc::clone(reducer_calls),
            fail_on: fail_on.to_vec(),
        }),
        opts,
    )
}

fn backward_calls(log: &CallLog) -> Vec<Call> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|c| c.direction == Direction::Backward)
        .cloned()
        .collect()
}

fn forward_calls(log: &CallLog) -> Vec<Call> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|c| c.direction == Direction::Forward)
        .cloned()
        .collect()
}

#[tokio::test]
async fn test_no_reflection_single_pass_respects_budget() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![
        ScriptedExpert::boxed("a", &log),
        ScriptedExpert::boxed("b", &log),
        ScriptedExpert::boxed("c", &log),
    ];

    let outcome = session(experts, options(2, 3, false), &reducer_calls)
        .run(&problem(0))
        .await
        .unwrap();

    let forward = outcome
        .transcript
        .query(&CommentFilter::all().direction(Direction::Forward));
    assert_eq!(forward.len(), 2);
    assert_eq!(outcome.transcript.len(), 2);
    assert_eq!(reducer_calls.load(Ordering::SeqCst), 1);
    assert!(outcome.artifact.is_some());
    assert!(outcome.verdict.is_none());
    assert_eq!(outcome.status, SessionStatus::Unverified);

    assert_eq!(outcome.trials.len(), 1);
    assert_eq!(outcome.trials[0].phases(), vec![Phase::Synthesizing, Phase::Done]);
    let selected: Vec<String> = outcome.trials[0].selected.iter().map(|i| i.to_string()).collect();
    assert_eq!(selected, vec!["a", "b"]);
}

#[tokio::test]
async fn test_failed_trial_reflects_once_then_ends() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![ScriptedExpert::boxed("a", &log), ScriptedExpert::boxed("b", &log)];
    // Trial 0 fails its single fixture, trial 1 fails too
    let runner = QueueRunner::new(vec![Ok(json!(99.0))]);

    let outcome = session(experts, options(2, 2, true), &reducer_calls)
        .with_evaluator(Evaluator::new(runner))
        .run(&problem(1))
        .await
        .unwrap();

    assert_eq!(outcome.trials.len(), 2);
    assert_eq!(
        outcome.trials[0].phases(),
        vec![Phase::Synthesizing, Phase::Evaluating, Phase::Reflecting, Phase::Collaborating]
    );
    assert_eq!(
        outcome.trials[1].phases(),
        vec![Phase::Synthesizing, Phase::Evaluating, Phase::Done]
    );

    let backward: Vec<Call> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.direction == Direction::Backward)
        .cloned()
        .collect();
    let names: Vec<&str> = backward.iter().map(|c| c.expert.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert!(backward.iter().all(|c| c.round == 0));

    assert_eq!(reducer_calls.load(Ordering::SeqCst), 2);
    assert_eq!(outcome.status, SessionStatus::VerificationFailed);
    assert_eq!(outcome.verdict.as_ref().unwrap().kind, VerdictKind::Fail);
    assert_eq!(outcome.artifact.as_ref().unwrap().round, 1);
}

#[tokio::test]
async fn test_second_trial_sees_reflections() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![ScriptedExpert::boxed("a", &log), ScriptedExpert::boxed("b", &log)];
    let runner = QueueRunner::new(vec![Ok(json!(1.0)), Ok(json!(10.0))]);

    let outcome = session(experts, options(2, 3, true), &reducer_calls)
        .with_evaluator(Evaluator::new(runner))
        .run(&problem(1))
        .await
        .unwrap();

    // Passing on trial 1 stops before the budget
    assert_eq!(outcome.trials.len(), 2);
    assert_eq!(outcome.status, SessionStatus::Verified);

    let forward = forward_calls(&log);
    let first_in_trial_1 = forward.iter().find(|c| c.round == 1).unwrap();
    assert!(first_in_trial_1
        .observed
        .iter()
        .any(|c| c.direction() == Direction::Backward));
}

#[tokio::test]
async fn test_generation_failure_aborts_trial_without_reducer() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![
        ScriptedExpert::boxed("a", &log),
        ScriptedExpert::failing("b", &log),
        ScriptedExpert::boxed("c", &log),
    ];

    let outcome = session(experts, options(3, 1, true), &reducer_calls)
        .with_evaluator(Evaluator::new(QueueRunner::new(vec![Ok(json!(10.0))])))
        .run(&problem(1))
        .await
        .unwrap();

    assert_eq!(reducer_calls.load(Ordering::SeqCst), 0);
    assert_eq!(outcome.transcript.len(), 1);
    assert_eq!(outcome.transcript.as_slice()[0].author().as_str(), "a");
    assert_eq!(outcome.status, SessionStatus::NoArtifact);
    assert!(outcome.artifact.is_none());
    let error = outcome.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::Generation);
    assert_eq!(error.cause, Some(GenerationCause::ServerError));
    assert_eq!(outcome.trials[0].error.as_ref(), Some(error));
    assert_eq!(outcome.trials[0].phases(), vec![Phase::Done]);
    // "c" is never consulted once "b" fails
    assert!(forward_calls(&log).iter().all(|c| c.expert != "c"));
}

#[tokio::test]
async fn test_aborted_trial_moves_to_next_when_budget_remains() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![ScriptedExpert::failing("a", &log)];

    let outcome = session(experts, options(1, 2, true), &reducer_calls)
        .with_evaluator(Evaluator::new(QueueRunner::new(vec![Ok(json!(10.0))])))
        .run(&problem(1))
        .await
        .unwrap();

    assert_eq!(outcome.trials.len(), 2);
    assert_eq!(outcome.trials[0].phases(), vec![Phase::Collaborating]);
    assert_eq!(outcome.trials[1].phases(), vec![Phase::Done]);
    assert_eq!(outcome.status, SessionStatus::NoArtifact);
}

#[tokio::test]
async fn test_one_raising_fixture_gives_partial() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let runner = QueueRunner::new(vec![
        Ok(json!(10.0)),
        Err("ZeroDivisionError: division by zero".to_string()),
        Ok(json!(10.0)),
    ]);

    let outcome = session(vec![ScriptedExpert::boxed("a", &log)], options(1, 1, true), &reducer_calls)
        .with_evaluator(Evaluator::new(runner))
        .run(&problem(3))
        .await
        .unwrap();

    let verdict = outcome.verdict.unwrap();
    assert_eq!(verdict.kind, VerdictKind::Partial);
    assert_eq!(verdict.count(FixtureStatus::Errored), 1);
    assert_eq!(verdict.count(FixtureStatus::Passed), 2);
    assert_eq!(outcome.status, SessionStatus::VerificationFailed);
}

#[tokio::test]
async fn test_each_expert_sees_prefix_of_the_next() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![
        ScriptedExpert::boxed("a", &log),
        ScriptedExpert::boxed("b", &log),
        ScriptedExpert::boxed("c", &log),
    ];

    session(experts, options(3, 1, false), &reducer_calls)
        .run(&problem(0))
        .await
        .unwrap();

    let forward = forward_calls(&log);
    assert_eq!(forward.len(), 3);
    for pair in forward.windows(2) {
        let (earlier, later) = (&pair[0].observed, &pair[1].observed);
        assert!(earlier.len() < later.len());
        assert_eq!(earlier.as_slice(), &later[..earlier.len()]);
    }
    assert!(forward[0].observed.is_empty());
}

#[tokio::test]
async fn test_missing_fixtures_is_session_error() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));

    let err = session(vec![ScriptedExpert::boxed("a", &log)], options(1, 2, true), &reducer_calls)
        .with_evaluator(Evaluator::new(QueueRunner::new(vec![Ok(json!(1.0))])))
        .run(&problem(0))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reflection_without_evaluator_is_config_error() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));

    let err = session(vec![ScriptedExpert::boxed("a", &log)], options(1, 2, true), &reducer_calls)
        .run(&problem(0))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Config(_)));
}

#[tokio::test]
async fn test_backward_failure_ends_reflection_and_advances() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![ScriptedExpert::stubborn("a", &log), ScriptedExpert::boxed("b", &log)];
    let runner = QueueRunner::new(vec![Ok(json!(99.0))]);

    let outcome = session(experts, options(2, 2, true), &reducer_calls)
        .with_evaluator(Evaluator::new(runner))
        .run(&problem(1))
        .await
        .unwrap();

    // "a" fails first, so "b" is never asked to reflect
    let names: Vec<String> = backward_calls(&log).into_iter().map(|c| c.expert).collect();
    assert_eq!(names, vec!["a"]);
    assert!(outcome
        .transcript
        .iter()
        .all(|c| c.direction() == Direction::Forward));

    assert_eq!(outcome.trials.len(), 2);
    assert_eq!(
        outcome.trials[0].phases(),
        vec![Phase::Synthesizing, Phase::Evaluating, Phase::Reflecting, Phase::Collaborating]
    );
    let error = outcome.trials[0].error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::Generation);
    assert_eq!(error.cause, Some(GenerationCause::Timeout));
    assert!(outcome.trials[1].error.is_none());

    // The next trial still runs in full
    assert_eq!(reducer_calls.load(Ordering::SeqCst), 2);
    assert_eq!(forward_calls(&log).iter().filter(|c| c.round == 1).count(), 2);
    assert_eq!(outcome.status, SessionStatus::VerificationFailed);
    assert_eq!(outcome.artifact.as_ref().unwrap().round, 1);
    assert_eq!(outcome.error.as_ref(), Some(error));
}

#[tokio::test]
async fn test_reducer_failure_restarts_collaboration() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![ScriptedExpert::boxed("a", &log)];
    let runner = QueueRunner::new(vec![Ok(json!(10.0))]);

    let outcome = session_with_flaky_reducer(experts, options(1, 3, true), &reducer_calls, &[0])
        .with_evaluator(Evaluator::new(runner))
        .run(&problem(1))
        .await
        .unwrap();

    assert_eq!(outcome.trials.len(), 2);
    assert_eq!(
        outcome.trials[0].phases(),
        vec![Phase::Synthesizing, Phase::Collaborating]
    );
    assert!(outcome.trials[0].artifact.is_none());
    assert_eq!(
        outcome.trials[0].error.as_ref().map(|e| e.kind),
        Some(ErrorKind::Synthesis)
    );
    // No reflection after a failed synthesis
    assert!(backward_calls(&log).is_empty());

    assert_eq!(
        outcome.trials[1].phases(),
        vec![Phase::Synthesizing, Phase::Evaluating, Phase::Done]
    );
    assert_eq!(outcome.status, SessionStatus::Verified);
    assert_eq!(outcome.artifact.as_ref().unwrap().round, 1);
    assert_eq!(outcome.error.as_ref().map(|e| e.kind), Some(ErrorKind::Synthesis));
}

#[tokio::test]
async fn test_reducer_failure_on_last_trial_keeps_previous_result() {
    let log = CallLog::default();
    let reducer_calls = Arc::new(AtomicUsize::new(0));
    let experts = vec![ScriptedExpert::boxed("a", &log), ScriptedExpert::boxed("b", &log)];
    let runner = QueueRunner::new(vec![Ok(json!(99.0))]);

    let outcome = session_with_flaky_reducer(experts, options(2, 2, true), &reducer_calls, &[1])
        .with_evaluator(Evaluator::new(runner))
        .run(&problem(1))
        .await
        .unwrap();

    assert_eq!(outcome.trials.len(), 2);
    assert_eq!(outcome.trials[1].phases(), vec![Phase::Synthesizing, Phase::Done]);
    assert!(outcome.trials[1].artifact.is_none());

    // Trial 0's artifact and verdict remain the session result
    let artifact = outcome.artifact.as_ref().unwrap();
    assert_eq!(artifact.round, 0);
    assert_eq!(outcome.trials[0].artifact.as_ref(), Some(artifact));
    assert_eq!(outcome.verdict.as_ref().unwrap().kind, VerdictKind::Fail);
    assert_eq!(outcome.status, SessionStatus::VerificationFailed);
    assert_eq!(outcome.error.as_ref().map(|e| e.kind), Some(ErrorKind::Synthesis));
}
