//! Protocol and problem types
//!
//! The comment protocol (`Comment`, `Direction`), the problem description
//! supplied by a store (`ProblemState`, `Fixture`, `OutputSchema`), and the
//! products of a trial (`Artifact`, `Verdict`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::errors::EngineError;

/// Identity of an expert, stable across forward and backward invocations
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpertId(String);

impl ExpertId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExpertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExpertId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Which half of the protocol produced a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Initial contribution during collaboration
    Forward,
    /// Revision produced from evaluation feedback
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Immutable unit of communication between experts
///
/// Fields are private: once built, a comment can only be read. Revisions are
/// new comments with the same author and a later round or direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    author: ExpertId,
    round: u32,
    direction: Direction,
    content: String,
}

impl Comment {
    pub fn new(author: ExpertId, round: u32, direction: Direction, content: impl Into<String>) -> Self {
        Self {
            author,
            round,
            direction,
            content: content.into(),
        }
    }

    /// A forward contribution for `round`
    pub fn forward(author: ExpertId, round: u32, content: impl Into<String>) -> Self {
        Self::new(author, round, Direction::Forward, content)
    }

    /// A backward revision for `round`
    pub fn backward(author: ExpertId, round: u32, content: impl Into<String>) -> Self {
        Self::new(author, round, Direction::Backward, content)
    }

    pub fn author(&self) -> &ExpertId {
        &self.author
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// How a fixture's actual output is compared to its expected output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputSchema {
    /// Values must be equal
    Exact,
    /// Numbers may differ by `tolerance` (absolute, or relative to the expected value)
    Numeric { tolerance: f64 },
}

impl Default for OutputSchema {
    fn default() -> Self {
        OutputSchema::Numeric { tolerance: 1e-6 }
    }
}

/// One input/output pair the artifact must reproduce
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: String,
    pub input: Value,
    pub output: Value,
}

impl Fixture {
    pub fn new(id: impl Into<String>, input: Value, output: Value) -> Self {
        Self {
            id: id.into(),
            input,
            output,
        }
    }
}

/// A problem as supplied by the store; immutable for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemState {
    pub id: String,
    pub description: String,
    /// Starter code the final solution should follow
    #[serde(default)]
    pub code_template: Option<String>,
    #[serde(default)]
    pub schema: OutputSchema,
    #[serde(default)]
    pub fixtures: Vec<Fixture>,
}

impl ProblemState {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            code_template: None,
            schema: OutputSchema::default(),
            fixtures: Vec::new(),
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.code_template = Some(template.into());
        self
    }

    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_fixtures(mut self, fixtures: Vec<Fixture>) -> Self {
        self.fixtures = fixtures;
        self
    }
}

/// Candidate solution produced by a synthesis step
///
/// `raw` is always the full generated text. `code` is the extracted program
/// when extraction succeeded; otherwise `parse_error` says why it did not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub raw: String,
    pub code: Option<String>,
    pub parse_error: Option<String>,
    /// Trial index that produced this artifact
    pub round: u32,
}

impl Artifact {
    pub fn parsed(raw: impl Into<String>, code: impl Into<String>, round: u32) -> Self {
        Self {
            raw: raw.into(),
            code: Some(code.into()),
            parse_error: None,
            round,
        }
    }

    pub fn degraded(raw: impl Into<String>, parse_error: impl Into<String>, round: u32) -> Self {
        Self {
            raw: raw.into(),
            code: None,
            parse_error: Some(parse_error.into()),
            round,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.code.is_none()
    }

    /// The text to persist as the generated program
    pub fn program(&self) -> &str {
        self.code.as_deref().unwrap_or(&self.raw)
    }
}

/// Outcome of a single fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStatus {
    Passed,
    /// Ran, but produced the wrong output
    Mismatch,
    /// Raised, timed out, or produced unreadable output
    Errored,
}

/// Per-fixture diagnostic carried by a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureDiagnostic {
    pub fixture_id: String,
    pub status: FixtureStatus,
    pub expected: Value,
    pub actual: Option<Value>,
    pub error: Option<String>,
}

impl FixtureDiagnostic {
    pub fn passed(fixture: &Fixture, actual: Value) -> Self {
        Self {
            fixture_id: fixture.id.clone(),
            status: FixtureStatus::Passed,
            expected: fixture.output.clone(),
            actual: Some(actual),
            error: None,
        }
    }

    pub fn mismatch(fixture: &Fixture, actual: Value) -> Self {
        Self {
            fixture_id: fixture.id.clone(),
            status: FixtureStatus::Mismatch,
            expected: fixture.output.clone(),
            actual: Some(actual),
            error: None,
        }
    }

    pub fn errored(fixture: &Fixture, error: impl Into<String>) -> Self {
        Self {
            fixture_id: fixture.id.clone(),
            status: FixtureStatus::Errored,
            expected: fixture.output.clone(),
            actual: None,
            error: Some(error.into()),
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == FixtureStatus::Passed
    }
}

/// Aggregate verdict kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictKind {
    /// Every fixture passed
    Pass,
    /// Some fixtures passed
    Partial,
    /// No fixture passed
    Fail,
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerdictKind::Pass => write!(f, "PASS"),
            VerdictKind::Partial => write!(f, "PARTIAL"),
            VerdictKind::Fail => write!(f, "FAIL"),
        }
    }
}

/// Result of evaluating an artifact against a fixture set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub kind: VerdictKind,
    /// One entry per fixture, in fixture order
    pub diagnostics: Vec<FixtureDiagnostic>,
}

impl Verdict {
    /// Aggregate per-fixture diagnostics into a verdict.
    ///
    /// An empty diagnostic list has no meaningful verdict and is rejected
    /// with `NotFound`.
    pub fn from_diagnostics(diagnostics: Vec<FixtureDiagnostic>) -> Result<Self, EngineError> {
        if diagnostics.is_empty() {
            return Err(EngineError::NotFound(
                "cannot judge an artifact against an empty fixture set".to_string(),
            ));
        }

        let passed = diagnostics.iter().filter(|d| d.is_pass()).count();
        let kind = if passed == diagnostics.len() {
            VerdictKind::Pass
        } else if passed > 0 {
            VerdictKind::Partial
        } else {
            VerdictKind::Fail
        };

        Ok(Self { kind, diagnostics })
    }

    pub fn is_pass(&self) -> bool {
        self.kind == VerdictKind::Pass
    }

    pub fn passed_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_pass()).count()
    }

    pub fn count(&self, status: FixtureStatus) -> usize {
        self.diagnostics.iter().filter(|d| d.status == status).count()
    }

    /// Compact status line
    pub fn summary_line(&self) -> String {
        format!(
            "{} ({}/{} fixtures passed)",
            self.kind,
            self.passed_count(),
            self.diagnostics.len()
        )
    }

    /// Human-readable description of every failing fixture, used as
    /// reflection feedback
    pub fn feedback(&self) -> String {
        let mut out = self.summary_line();
        for diag in self.diagnostics.iter().filter(|d| !d.is_pass()) {
            out.push('\n');
            match diag.status {
                FixtureStatus::Errored => out.push_str(&format!(
                    "- fixture {} raised: {}",
                    diag.fixture_id,
                    diag.error.as_deref().unwrap_or("unknown error")
                )),
                _ => out.push_str(&format!(
                    "- fixture {} expected {} but got {}",
                    diag.fixture_id,
                    diag.expected,
                    diag.actual.as_ref().map(|v| v.to_string()).unwrap_or_default()
                )),
            }
        }
        out
    }
}
