//! Artifact verification against input/output fixtures
//!
//! A fixture that raises is a failed fixture with the error attached, never
//! an orchestrator error. Only an empty fixture set is refused.

use regex::Regex;
use sdk::errors::EngineError;
use sdk::types::{Artifact, Fixture, FixtureDiagnostic, OutputSchema, ProblemState, Verdict};
use serde_json::Value;
use std::sync::{Arc, OnceLock};

use crate::llm::TextGenerator;
use crate::parsing::extract_json_block;

pub mod runner;

pub use runner::{FixtureRunner, PythonRunner};

const TEST_ROLE: &str = "You are a test designer for optimization programs. You derive reference \
                         cases with exact expected results from problem statements.";

static TOP_LEVEL_DEF: OnceLock<Option<Regex>> = OnceLock::new();

fn top_level_defs(code: &str) -> impl Iterator<Item = &str> {
    TOP_LEVEL_DEF
        .get_or_init(|| Regex::new(r"(?m)^def\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").ok())
        .iter()
        .flat_map(move |re| re.captures_iter(code))
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
}

/// Name of the first top-level function defined in `code`
pub fn entry_point(code: &str) -> Option<String> {
    top_level_defs(code).next().map(str::to_string)
}

/// Function to call in `code`: the starter code's function when the program
/// defines it, else the program's first top-level function
pub fn resolve_entry_point(code: &str, template: Option<&str>) -> Option<String> {
    let wanted = template.and_then(entry_point);
    match wanted {
        Some(name) if top_level_defs(code).any(|def| def == name) => Some(name),
        _ => entry_point(code),
    }
}

/// Compare an actual result to the expected one under `schema`
pub fn outputs_match(expected: &Value, actual: &Value, schema: &OutputSchema) -> bool {
    match (expected, actual) {
        (Value::Number(e), Value::Number(a)) => match (e.as_f64(), a.as_f64()) {
            (Some(e), Some(a)) => match schema {
                OutputSchema::Exact => e == a,
                OutputSchema::Numeric { tolerance } => {
                    let diff = (e - a).abs();
                    diff <= *tolerance || diff <= tolerance * e.abs()
                }
            },
            _ => false,
        },
        (Value::Array(e), Value::Array(a)) => {
            e.len() == a.len() && e.iter().zip(a).all(|(e, a)| outputs_match(e, a, schema))
        }
        (Value::Object(e), Value::Object(a)) => {
            e.len() == a.len()
                && e.iter()
                    .all(|(k, ev)| a.get(k).is_some_and(|av| outputs_match(ev, av, schema)))
        }
        _ => expected == actual,
    }
}

/// Runs artifacts against fixtures, and derives fixtures when a problem has none
pub struct Evaluator {
    runner: Arc<dyn FixtureRunner>,
    generator: Option<TextGenerator>,
}

impl Evaluator {
    pub fn new(runner: Arc<dyn FixtureRunner>) -> Self {
        Self {
            runner,
            generator: None,
        }
    }

    /// Enable `generate_tests`
    pub fn with_generator(mut self, generator: TextGenerator) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn can_generate_tests(&self) -> bool {
        self.generator.is_some()
    }

    /// Ask the model for reference fixtures.
    ///
    /// # Errors
    /// `NotFound` when no generator is configured, `Generation` when the call
    /// fails, `Parse` when the reply holds no usable fixture list.
    pub async fn generate_tests(&self, problem: &ProblemState) -> Result<Vec<Fixture>, EngineError> {
        let generator = self.generator.as_ref().ok_or_else(|| {
            EngineError::NotFound(format!("no fixtures for {} and test generation is disabled", problem.id))
        })?;

        let prompt = format!(
            "The problem is:\n{}\n\nStarter code:\n{}\n\n\
             Work out the correct answer for this problem, and for up to two small variations if the \
             starter function takes parameters. Reply with a JSON list only, each item shaped as \
             {{\"input\": {{<parameter name>: <value>}}, \"output\": <expected return value>}}. Use an \
             empty object as input when the function takes no parameters.",
            problem.description,
            problem.code_template.as_deref().unwrap_or("(none)")
        );

        let reply = generator.generate(TEST_ROLE, &prompt).await?;
        let value = extract_json_block(&reply)?;
        let fixtures = parse_fixtures(&value).ok_or_else(|| {
            EngineError::parse("reply is not a list of {input, output} objects", reply.clone())
        })?;

        tracing::info!(problem = %problem.id, count = fixtures.len(), "Generated fixtures");
        Ok(fixtures)
    }

    /// Execute the artifact on every fixture and aggregate a verdict.
    ///
    /// The called function follows [`resolve_entry_point`] against the
    /// problem's starter code; outputs are compared under the problem's schema.
    ///
    /// # Errors
    /// `NotFound` for an empty fixture set.
    pub async fn evaluate(
        &self,
        problem: &ProblemState,
        artifact: &Artifact,
        fixtures: &[Fixture],
    ) -> Result<Verdict, EngineError> {
        if fixtures.is_empty() {
            return Err(EngineError::NotFound(
                "cannot evaluate against an empty fixture set".to_string(),
            ));
        }

        let template = problem.code_template.as_deref();
        let entry = artifact
            .code
            .as_deref()
            .and_then(|code| resolve_entry_point(code, template));
        let unrunnable = match (&artifact.code, &artifact.parse_error, &entry) {
            (None, Some(reason), _) => Some(format!("no runnable code: {}", reason)),
            (None, None, _) => Some("no runnable code".to_string()),
            (Some(_), _, None) => Some("no top-level function definition in code".to_string()),
            _ => None,
        };

        let mut diagnostics = Vec::with_capacity(fixtures.len());
        for fixture in fixtures {
            let diagnostic = match (&unrunnable, &artifact.code, &entry) {
                (Some(reason), _, _) => FixtureDiagnostic::errored(fixture, reason.clone()),
                (None, Some(code), Some(entry)) => {
                    match self.runner.run(code, entry, &fixture.input).await {
                        Ok(actual) if outputs_match(&fixture.output, &actual, &problem.schema) => {
                            FixtureDiagnostic::passed(fixture, actual)
                        }
                        Ok(actual) => FixtureDiagnostic::mismatch(fixture, actual),
                        Err(error) => {
                            let error = EngineError::Execution(error);
                            tracing::debug!(fixture = %fixture.id, "{}", error);
                            FixtureDiagnostic::errored(fixture, error.to_string())
                        }
                    }
                }
                _ => FixtureDiagnostic::errored(fixture, "no runnable code"),
            };
            diagnostics.push(diagnostic);
        }

        let verdict = Verdict::from_diagnostics(diagnostics)?;
        tracing::info!(
            problem = %problem.id,
            entry = entry.as_deref().unwrap_or("-"),
            "Verdict {}",
            verdict.summary_line()
        );
        Ok(verdict)
    }
}

/// Read `[{"input": .., "output": ..}, ..]`, numbering fixtures by position
pub fn parse_fixtures(value: &Value) -> Option<Vec<Fixture>> {
    let items = value.as_array()?;
    if items.is_empty() {
        return None;
    }
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let output = item.get("output")?.clone();
            let input = item.get("input").cloned().unwrap_or(Value::Object(Default::default()));
            let id = item
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| i.to_string());
            Some(Fixture::new(id, input, output))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdk::types::{FixtureStatus, VerdictKind};
    use serde_json::json;

    /// Answers from a table keyed by the fixture input's `case` field
    struct TableRunner;

    #[async_trait]
    impl FixtureRunner for TableRunner {
        async fn run(&self, _code: &str, _entry: &str, input: &Value) -> Result<Value, String> {
            match input.get("case").and_then(|c| c.as_str()) {
                Some("ok") => Ok(json!(6.0000001)),
                Some("wrong") => Ok(json!(9.0)),
                _ => Err("ValueError: infeasible".to_string()),
            }
        }
    }

    fn fixture(id: &str, case: &str) -> Fixture {
        Fixture::new(id, json!({ "case": case }), json!(6.0))
    }

    fn exact_problem() -> ProblemState {
        ProblemState::new("prob_1", "d")
            .with_template("def prob_1(case):\n    pass\n")
            .with_schema(OutputSchema::Exact)
    }

    fn numeric_problem() -> ProblemState {
        exact_problem().with_schema(OutputSchema::Numeric { tolerance: 1e-6 })
    }

    fn artifact() -> Artifact {
        Artifact::parsed("raw", "def prob_1(case):\n    return 6.0", 0)
    }

    #[test]
    fn test_entry_point() {
        assert_eq!(
            entry_point("import x\n\ndef prob_287():\n    pass\n"),
            Some("prob_287".to_string())
        );
        assert_eq!(entry_point("    def inner():\n        pass"), None);
    }

    #[test]
    fn test_starter_function_wins_over_earlier_helper() {
        let code = "def build_costs():\n    return [820, 550]\n\ndef prob_287():\n    return 6240.0\n";
        let template = "def prob_287():\n    pass\n";
        assert_eq!(resolve_entry_point(code, Some(template)), Some("prob_287".to_string()));
        // Renamed or missing starter function falls back to the first definition
        assert_eq!(
            resolve_entry_point(code, Some("def prob_1():\n    pass\n")),
            Some("build_costs".to_string())
        );
        assert_eq!(resolve_entry_point(code, None), Some("build_costs".to_string()));
        assert_eq!(resolve_entry_point("x = 1\n", Some(template)), None);
    }

    /// Answers by the function it was asked to call
    struct EntryRunner;

    #[async_trait]
    impl FixtureRunner for EntryRunner {
        async fn run(&self, _code: &str, entry: &str, _input: &Value) -> Result<Value, String> {
            match entry {
                "prob_287" => Ok(json!(6240.0)),
                other => Ok(json!(format!("called {}", other))),
            }
        }
    }

    #[tokio::test]
    async fn test_helper_before_entry_point_still_passes() {
        let problem = ProblemState::new("prob_287", "Blend two feeds.")
            .with_template("def prob_287():\n    pass\n")
            .with_schema(OutputSchema::Numeric { tolerance: 1e-6 });
        let artifact = Artifact::parsed(
            "raw",
            "def build_costs():\n    return [820, 550]\n\ndef prob_287():\n    return 6240.0",
            0,
        );
        let verdict = Evaluator::new(Arc::new(EntryRunner))
            .evaluate(&problem, &artifact, &[Fixture::new("0", json!({}), json!(6240.0))])
            .await
            .unwrap();
        assert_eq!(verdict.kind, VerdictKind::Pass);
    }

    #[test]
    fn test_numeric_tolerance() {
        let schema = OutputSchema::Numeric { tolerance: 1e-6 };
        assert!(outputs_match(&json!(6240.0), &json!(6240.0000001), &schema));
        assert!(outputs_match(&json!([1, 2.0]), &json!([1.0, 2]), &schema));
        assert!(!outputs_match(&json!(1.0), &json!(1.1), &schema));
        assert!(!outputs_match(&json!([1.0]), &json!([1.0, 2.0]), &schema));
        assert!(outputs_match(&json!(3), &json!(3.0), &OutputSchema::Exact));
        assert!(!outputs_match(&json!("a"), &json!("b"), &OutputSchema::Exact));
    }

    #[tokio::test]
    async fn test_partial_with_one_raise() {
        let evaluator = Evaluator::new(Arc::new(TableRunner));
        let fixtures = vec![fixture("0", "ok"), fixture("1", "boom"), fixture("2", "ok")];
        let verdict = evaluator
            .evaluate(&numeric_problem(), &artifact(), &fixtures)
            .await
            .unwrap();

        assert_eq!(verdict.kind, VerdictKind::Partial);
        assert_eq!(verdict.count(FixtureStatus::Errored), 1);
        assert_eq!(verdict.count(FixtureStatus::Passed), 2);
        assert!(verdict.diagnostics[1]
            .error
            .as_deref()
            .unwrap()
            .contains("infeasible"));
    }

    #[tokio::test]
    async fn test_mismatch_records_actual() {
        let evaluator = Evaluator::new(Arc::new(TableRunner));
        let verdict = evaluator
            .evaluate(&exact_problem(), &artifact(), &[fixture("0", "wrong")])
            .await
            .unwrap();
        assert_eq!(verdict.kind, VerdictKind::Fail);
        assert_eq!(verdict.diagnostics[0].actual, Some(json!(9.0)));
    }

    #[tokio::test]
    async fn test_degraded_artifact_fails_every_fixture() {
        let evaluator = Evaluator::new(Arc::new(TableRunner));
        let degraded = Artifact::degraded("prose", "no fenced code block in output", 0);
        let verdict = evaluator
            .evaluate(&exact_problem(), &degraded, &[fixture("0", "ok"), fixture("1", "ok")])
            .await
            .unwrap();
        assert_eq!(verdict.kind, VerdictKind::Fail);
        assert_eq!(verdict.count(FixtureStatus::Errored), 2);
    }

    #[tokio::test]
    async fn test_empty_fixture_set_refused() {
        let evaluator = Evaluator::new(Arc::new(TableRunner));
        let err = evaluator
            .evaluate(&exact_problem(), &artifact(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_generate_tests_requires_generator() {
        let evaluator = Evaluator::new(Arc::new(TableRunner));
        let err = evaluator
            .generate_tests(&ProblemState::new("p", "d"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }

    #[test]
    fn test_parse_fixtures() {
        let fixtures = parse_fixtures(&json!([{"output": 5}, {"id": "big", "input": {"n": 3}, "output": 7}])).unwrap();
        assert_eq!(fixtures[0].id, "0");
        assert_eq!(fixtures[0].input, json!({}));
        assert_eq!(fixtures[1].id, "big");
        assert!(parse_fixtures(&json!([{"input": {}}])).is_none());
        assert!(parse_fixtures(&json!([])).is_none());
    }
}
