//! Command handlers for CLI operations
//!
//! - run: solve one problem
//! - batch: solve many problems concurrently
//! - experts: list the expert catalog
//! - doctor: validate configuration and check dependencies

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

use sdk::errors::{EngineError, ErrorExt, ErrorScope};
use sdk::types::{ExpertId, OutputSchema, ProblemState};

use crate::baseline::Baseline;
use crate::cli::{Algorithm, SolveArgs};
use crate::config::Config;
use crate::evaluator::{Evaluator, FixtureRunner, PythonRunner};
use crate::experts::catalog::CATALOG;
use crate::llm::{LLMProvider, OllamaProvider, OpenAIProvider, TextGenerator};
use crate::pool::CommentPool;
use crate::runlog::RunLog;
use crate::secrets::SecretManager;
use crate::session::{Session, SessionOutcome, SessionStatus, TrialRecord};
use crate::store::{DirectoryStore, ProblemStore};

const OPENAI_KEY: &str = "openai_api_key";
const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Fold command-line session options into the loaded configuration
pub fn apply_overrides(config: &mut Config, solve: &SolveArgs) -> Result<()> {
    if let Some(n) = solve.max_collaborate {
        config.session.max_collaborate_nums = n;
    }
    if let Some(n) = solve.max_trials {
        config.session.max_trials = n;
    }
    if solve.no_reflection {
        config.session.enable_reflection = false;
    }
    if let Some(model) = &solve.model {
        config.session.model = Some(model.clone());
    }
    config
        .validate_and_process()
        .context("Invalid session options")?;
    Ok(())
}

/// Provider selected by the configuration, wrapped in the retry policy
pub fn build_generator(config: &Config) -> Result<TextGenerator> {
    let model = config.effective_model();
    let provider: Arc<dyn LLMProvider> = match config.llm.default_provider.as_str() {
        "ollama" => Arc::new(OllamaProvider::from_config(&config.llm.ollama).with_model(model)),
        _ => {
            let key = SecretManager::default()
                .get_secret(OPENAI_KEY, OPENAI_KEY_ENV)
                .context("OpenAI provider selected but no API key is available")?;
            Arc::new(OpenAIProvider::new(config.llm.openai.clone(), key).with_model(model))
        }
    };
    tracing::info!(provider = provider.name(), model = provider.model(), "Using provider");
    Ok(TextGenerator::new(provider, config.retry.policy()))
}

fn report(error: EngineError) -> anyhow::Error {
    anyhow::anyhow!("{}\nHint: {}", error, error.user_hint())
}

fn build_runner(config: &Config) -> Arc<dyn FixtureRunner> {
    Arc::new(PythonRunner::new(
        config.evaluator.interpreter.clone(),
        std::time::Duration::from_secs(config.evaluator.timeout_secs),
    ))
}

fn open_store(config: &Config, solve: &SolveArgs) -> DirectoryStore {
    DirectoryStore::new(
        &solve.dataset,
        OutputSchema::Numeric {
            tolerance: config.evaluator.tolerance,
        },
    )
}

fn expert_filter(solve: &SolveArgs) -> Option<Vec<ExpertId>> {
    if solve.experts.is_empty() {
        None
    } else {
        Some(solve.experts.iter().map(|id| ExpertId::from(id.as_str())).collect())
    }
}

/// Solve one problem with the chosen algorithm.
///
/// Baselines are evaluated against the problem's own fixtures when evaluation
/// is enabled and fixtures exist; they never generate fixtures.
pub async fn solve_problem(
    config: &Config,
    generator: &TextGenerator,
    runner: Arc<dyn FixtureRunner>,
    algorithm: Algorithm,
    only_experts: Option<&[ExpertId]>,
    problem: &ProblemState,
) -> Result<SessionOutcome, EngineError> {
    let baseline = match algorithm {
        Algorithm::Coe => {
            return Session::from_config(config, generator, runner, only_experts)?
                .run(problem)
                .await;
        }
        Algorithm::Standard => Baseline::Standard,
        Algorithm::Cot => Baseline::ChainOfThought,
    };

    let mut record = TrialRecord::new(0);
    let (artifact, verdict, error) = match baseline.solve(generator, problem).await {
        Ok(artifact) => {
            record.artifact = Some(artifact.clone());
            let verdict = if config.session.enable_reflection && !problem.fixtures.is_empty() {
                let verdict = Evaluator::new(runner)
                    .evaluate(problem, &artifact, &problem.fixtures)
                    .await?;
                record.verdict = Some(verdict.clone());
                Some(verdict)
            } else {
                None
            };
            (Some(artifact), verdict, None)
        }
        Err(e) if e.scope() == ErrorScope::Session => return Err(e),
        Err(e) => {
            tracing::error!(problem = %problem.id, "Baseline failed: {}", e);
            record.error = Some(e.report());
            (None, None, Some(e.report()))
        }
    };

    Ok(SessionOutcome {
        problem_id: problem.id.clone(),
        status: SessionStatus::classify(artifact.as_ref(), verdict.as_ref()),
        artifact,
        verdict,
        transcript: CommentPool::new(),
        trials: vec![record],
        error,
    })
}

/// Solve one problem
pub async fn handle_run(
    problem_id: String,
    solve: SolveArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let mut config = config.clone();
    apply_overrides(&mut config, &solve)?;

    let store = open_store(&config, &solve);
    let problem = store.load_problem(&problem_id).map_err(report)?;
    let generator = build_generator(&config)?;
    let only = expert_filter(&solve);

    let outcome = solve_problem(
        &config,
        &generator,
        build_runner(&config),
        solve.algorithm,
        only.as_deref(),
        &problem,
    )
    .await
    .map_err(report)?;

    if !solve.no_log {
        let log = RunLog::create(
            &config.core.runs_dir,
            solve.algorithm.as_str(),
            &store.dataset_name(),
        )?;
        log.record(&outcome)?;
    }

    match format {
        OutputFormat::Text => print_outcome(&outcome),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
    }

    Ok(())
}

fn print_outcome(outcome: &SessionOutcome) {
    println!("Problem:  {}", outcome.problem_id);
    println!("Status:   {}", outcome.status);
    println!("Trials:   {}", outcome.trials.len());
    println!("Comments: {}", outcome.transcript.len());
    if let Some(verdict) = &outcome.verdict {
        println!();
        println!("{}", verdict.feedback());
    }
    if let Some(error) = &outcome.error {
        println!();
        println!("Last error: {}", error);
    }
    if let Some(artifact) = &outcome.artifact {
        println!();
        if let Some(reason) = &artifact.parse_error {
            println!("Reply could not be parsed ({}); raw text follows.", reason);
        }
        println!("{}", artifact.program());
    }
}

/// Pass-rate summary for a batch
#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub algorithm: String,
    pub dataset: String,
    pub total: usize,
    pub verified: usize,
    pub verification_failed: usize,
    pub unverified: usize,
    pub no_artifact: usize,
    /// Sessions that ended with a session-level error
    pub failed: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn add(&mut self, status: SessionStatus) {
        match status {
            SessionStatus::Verified => self.verified += 1,
            SessionStatus::VerificationFailed => self.verification_failed += 1,
            SessionStatus::Unverified => self.unverified += 1,
            SessionStatus::NoArtifact => self.no_artifact += 1,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.verified as f64 / self.total as f64
        }
    }
}

/// Solve many problems; each session owns its own transcript and experts
pub async fn handle_batch(
    problems: Vec<String>,
    concurrency: usize,
    solve: SolveArgs,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let mut config = config.clone();
    apply_overrides(&mut config, &solve)?;

    let store = open_store(&config, &solve);
    let ids = if problems.is_empty() {
        store.list_problems().map_err(report)?
    } else {
        problems
    };
    let generator = build_generator(&config)?;
    let runner = build_runner(&config);
    let only = expert_filter(&solve);
    let log = if solve.no_log {
        None
    } else {
        Some(RunLog::create(
            &config.core.runs_dir,
            solve.algorithm.as_str(),
            &store.dataset_name(),
        )?)
    };

    tracing::info!(problems = ids.len(), concurrency, "Starting batch");

    let config = &config;
    let generator = &generator;
    let store = &store;
    let runner = &runner;
    let only = only.as_deref();
    let algorithm = solve.algorithm;

    let mut results: Vec<(usize, String, Result<SessionOutcome, EngineError>)> =
        stream::iter(ids.into_iter().enumerate())
            .map(|(position, id)| async move {
                let result = match store.load_problem(&id) {
                    Ok(problem) => {
                        solve_problem(config, generator, Arc::clone(runner), algorithm, only, &problem)
                            .await
                    }
                    Err(e) => Err(e),
                };
                (position, id, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
    results.sort_by_key(|(position, _, _)| *position);

    let mut summary = BatchSummary {
        algorithm: algorithm.as_str().to_string(),
        dataset: store.dataset_name(),
        total: results.len(),
        ..Default::default()
    };
    for (_, id, result) in &results {
        match result {
            Ok(outcome) => {
                summary.add(outcome.status);
                if let Some(log) = &log {
                    log.record(outcome)?;
                }
            }
            Err(e) => {
                tracing::error!(problem = %id, "Session failed: {}", e);
                summary.failed.push((id.clone(), e.to_string()));
            }
        }
    }
    if let Some(log) = &log {
        log.write_summary(&summary)?;
    }

    match format {
        OutputFormat::Text => {
            println!("Batch: {} on {}", summary.algorithm, summary.dataset);
            for (_, id, result) in &results {
                match result {
                    Ok(outcome) => println!("  {:<20} {}", id, outcome.status),
                    Err(e) => println!("  {:<20} error: {}", id, e),
                }
            }
            println!();
            println!(
                "Verified {}/{} ({:.1}%)",
                summary.verified,
                summary.total,
                summary.pass_rate() * 100.0
            );
            if let Some(log) = &log {
                println!("Run log: {}", log.dir().display());
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "summary": summary,
                "pass_rate": summary.pass_rate(),
                "results": results.iter().map(|(_, id, result)| match result {
                    Ok(outcome) => json!({"problem_id": id, "status": outcome.status}),
                    Err(e) => json!({"problem_id": id, "error": e.to_string()}),
                }).collect::<Vec<_>>(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

/// List the expert catalog in declaration order
pub fn handle_experts(format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("Experts ({}):", CATALOG.len());
            for profile in &CATALOG {
                let reflects = if profile.backward_task.is_some() {
                    "reflects"
                } else {
                    "forward only"
                };
                println!("  {} [{}]", profile.id, reflects);
                println!("    {}", profile.description);
            }
        }
        OutputFormat::Json => {
            let output: Vec<_> = CATALOG
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "name": p.name,
                        "description": p.description,
                        "reflects": p.backward_task.is_some(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Validate configuration and check dependencies
pub async fn handle_doctor(config: &Config, format: OutputFormat) -> Result<()> {
    let mut issues = Vec::new();
    let mut checks: Vec<(&str, String)> = Vec::new();

    // Config is already validated when loaded
    checks.push(("Configuration", "Valid".to_string()));
    checks.push((
        "Provider",
        format!("{} ({})", config.llm.default_provider, config.effective_model()),
    ));

    if config.llm.default_provider == "openai" {
        if SecretManager::default().has_secret(OPENAI_KEY, OPENAI_KEY_ENV) {
            checks.push(("OpenAI API key", "Configured".to_string()));
        } else {
            checks.push(("OpenAI API key", "Not configured".to_string()));
            issues.push(format!(
                "No OpenAI API key. Set ${} or store '{}' in the keychain.",
                OPENAI_KEY_ENV, OPENAI_KEY
            ));
        }
    }

    match build_generator(config) {
        Ok(generator) => {
            if generator.provider().check_health().await {
                checks.push(("Provider health", "Reachable".to_string()));
            } else {
                checks.push(("Provider health", "Unreachable".to_string()));
                issues.push(format!(
                    "Provider '{}' did not answer its health check.",
                    generator.provider().name()
                ));
            }
        }
        Err(e) => {
            checks.push(("Provider health", "Not checked".to_string()));
            issues.push(format!("Cannot build provider: {:#}", e));
        }
    }

    let runner = PythonRunner::new(
        config.evaluator.interpreter.clone(),
        std::time::Duration::from_secs(config.evaluator.timeout_secs),
    );
    if runner.is_available().await {
        checks.push(("Interpreter", format!("{} available", runner.interpreter())));
    } else {
        checks.push(("Interpreter", "Missing".to_string()));
        issues.push(format!(
            "Interpreter '{}' cannot be started; fixtures cannot run.",
            runner.interpreter()
        ));
    }

    if config.core.runs_dir.exists() {
        checks.push(("Runs directory", "Exists".to_string()));
    } else {
        checks.push(("Runs directory", "Will be created".to_string()));
    }

    match format {
        OutputFormat::Text => {
            println!("CoE System Diagnostics");
            println!("======================");
            println!();

            println!("System Checks:");
            for (check, status) in &checks {
                println!("  {:<20} {}", format!("{}:", check), status);
            }

            println!();

            if issues.is_empty() {
                println!("✓ All checks passed!");
            } else {
                println!("⚠ Issues found:");
                println!();
                for (i, issue) in issues.iter().enumerate() {
                    println!("  {}. {}", i + 1, issue);
                }
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "checks": checks.iter().map(|(name, status)| {
                    json!({
                        "name": name,
                        "status": status
                    })
                }).collect::<Vec<_>>(),
                "issues": issues,
                "healthy": issues.is_empty()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
