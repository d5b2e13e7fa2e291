//! Read-only problem sources
//!
//! A dataset directory holds one subdirectory per problem:
//!
//! ```text
//! <root>/<id>/description.txt   required
//! <root>/<id>/code_example.py   optional starter code
//! <root>/<id>/sample.json       optional [{"input": .., "output": ..}, ..]
//! <root>/<id>/schema.json       optional {"kind": "exact"} | {"kind": "numeric", "tolerance": ..}
//! ```

use sdk::errors::EngineError;
use sdk::types::{OutputSchema, ProblemState};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::evaluator::parse_fixtures;

/// Source of problems, read-only from the engine's point of view
pub trait ProblemStore: Send + Sync {
    /// # Errors
    /// `NotFound` when the problem does not exist.
    fn load_problem(&self, id: &str) -> Result<ProblemState, EngineError>;

    /// Problem identifiers in a stable order
    fn list_problems(&self) -> Result<Vec<String>, EngineError>;
}

/// Problems laid out as directories on disk
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
    default_schema: OutputSchema,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>, default_schema: OutputSchema) -> Self {
        Self {
            root: root.into(),
            default_schema,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dataset name used in run directory names
    pub fn dataset_name(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string())
    }

    fn read_optional(path: &Path) -> Result<Option<String>, EngineError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngineError::Io(e)),
        }
    }
}

/// Sort key that orders `prob_2` before `prob_10`
fn natural_key(name: &str) -> (String, u64, String) {
    let digits_at = name
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let (prefix, digits) = name.split_at(digits_at);
    (
        prefix.to_string(),
        digits.parse().unwrap_or(u64::MAX),
        name.to_string(),
    )
}

impl ProblemStore for DirectoryStore {
    fn load_problem(&self, id: &str) -> Result<ProblemState, EngineError> {
        if id.is_empty() || id.contains(['/', '\\']) || id == ".." {
            return Err(EngineError::NotFound(format!("invalid problem id '{}'", id)));
        }
        let dir = self.root.join(id);
        if !dir.is_dir() {
            return Err(EngineError::NotFound(format!(
                "problem '{}' not found under {}",
                id,
                self.root.display()
            )));
        }

        let description = Self::read_optional(&dir.join("description.txt"))?
            .ok_or_else(|| EngineError::NotFound(format!("problem '{}' has no description.txt", id)))?;

        let mut problem = ProblemState::new(id, description.trim()).with_schema(self.default_schema);

        if let Some(template) = Self::read_optional(&dir.join("code_example.py"))? {
            problem = problem.with_template(template);
        }

        if let Some(raw) = Self::read_optional(&dir.join("sample.json"))? {
            let value: serde_json::Value = serde_json::from_str(&raw)
                .map_err(|e| EngineError::parse(format!("{}/sample.json: {}", id, e), raw.clone()))?;
            let fixtures = parse_fixtures(&value).ok_or_else(|| {
                EngineError::parse(format!("{}/sample.json is not a fixture list", id), raw.clone())
            })?;
            problem = problem.with_fixtures(fixtures);
        }

        if let Some(raw) = Self::read_optional(&dir.join("schema.json"))? {
            let schema: OutputSchema = serde_json::from_str(&raw)
                .map_err(|e| EngineError::parse(format!("{}/schema.json: {}", id, e), raw.clone()))?;
            problem = problem.with_schema(schema);
        }

        tracing::debug!(problem = %id, fixtures = problem.fixtures.len(), "Loaded problem");
        Ok(problem)
    }

    fn list_problems(&self) -> Result<Vec<String>, EngineError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            EngineError::NotFound(format!("dataset {}: {}", self.root.display(), e))
        })?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.path().join("description.txt").is_file() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort_by_key(|id| natural_key(id));
        Ok(ids)
    }
}

/// In-memory problems, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    problems: BTreeMap<String, ProblemState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, problem: ProblemState) {
        self.problems.insert(problem.id.clone(), problem);
    }
}

impl ProblemStore for MemoryStore {
    fn load_problem(&self, id: &str) -> Result<ProblemState, EngineError> {
        self.problems
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("problem '{}' not found", id)))
    }

    fn list_problems(&self) -> Result<Vec<String>, EngineError> {
        let mut ids: Vec<String> = self.problems.keys().cloned().collect();
        ids.sort_by_key(|id| natural_key(id));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_problem(root: &Path, id: &str, files: &[(&str, &str)]) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            fs::write(dir.join(name), content).unwrap();
        }
    }

    fn store(root: &Path) -> DirectoryStore {
        DirectoryStore::new(root, OutputSchema::Numeric { tolerance: 1e-6 })
    }

    #[test]
    fn test_load_full_problem() {
        let tmp = tempfile::tempdir().unwrap();
        write_problem(
            tmp.path(),
            "prob_287",
            &[
                ("description.txt", "Minimize feed cost.\n"),
                ("code_example.py", "def prob_287():\n    pass\n"),
                ("sample.json", r#"[{"input": {}, "output": 13120.0}]"#),
                ("schema.json", r#"{"kind": "exact"}"#),
            ],
        );

        let problem = store(tmp.path()).load_problem("prob_287").unwrap();
        assert_eq!(problem.description, "Minimize feed cost.");
        assert!(problem.code_template.unwrap().starts_with("def prob_287"));
        assert_eq!(problem.fixtures.len(), 1);
        assert_eq!(problem.fixtures[0].output, json!(13120.0));
        assert_eq!(problem.schema, OutputSchema::Exact);
    }

    #[test]
    fn test_optional_files_absent() {
        let tmp = tempfile::tempdir().unwrap();
        write_problem(tmp.path(), "prob_1", &[("description.txt", "x")]);

        let problem = store(tmp.path()).load_problem("prob_1").unwrap();
        assert!(problem.code_template.is_none());
        assert!(problem.fixtures.is_empty());
        assert_eq!(problem.schema, OutputSchema::Numeric { tolerance: 1e-6 });
    }

    #[test]
    fn test_missing_problem_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        write_problem(tmp.path(), "prob_2", &[("code_example.py", "x")]);

        let store = store(tmp.path());
        assert!(matches!(store.load_problem("prob_404"), Err(EngineError::NotFound(_))));
        assert!(matches!(store.load_problem("prob_2"), Err(EngineError::NotFound(_))));
        assert!(matches!(store.load_problem("../etc"), Err(EngineError::NotFound(_))));
    }

    #[test]
    fn test_bad_sample_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_problem(tmp.path(), "prob_3", &[("description.txt", "x"), ("sample.json", "{oops")]);
        assert!(matches!(
            store(tmp.path()).load_problem("prob_3"),
            Err(EngineError::Parse { .. })
        ));
    }

    #[test]
    fn test_list_problems_natural_order() {
        let tmp = tempfile::tempdir().unwrap();
        for id in ["prob_10", "prob_2", "prob_1"] {
            write_problem(tmp.path(), id, &[("description.txt", "x")]);
        }
        write_problem(tmp.path(), "notes", &[("readme.md", "x")]);

        let ids = store(tmp.path()).list_problems().unwrap();
        assert_eq!(ids, vec!["prob_1", "prob_2", "prob_10"]);
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        store.insert(ProblemState::new("b", "second"));
        store.insert(ProblemState::new("a", "first"));
        assert_eq!(store.list_problems().unwrap(), vec!["a", "b"]);
        assert_eq!(store.load_problem("a").unwrap().description, "first");
        assert!(store.load_problem("c").is_err());
    }
}
