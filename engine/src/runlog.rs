//! On-disk record of a run
//!
//! ```text
//! <runs_dir>/run_<algorithm>_<dataset>_<unix_ts>/
//!     <id>_generated_code.py
//!     <id>_transcript.json
//!     <id>_result.json
//!     summary.json
//! ```

use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};

use sdk::errors::EngineError;

use crate::session::SessionOutcome;

/// Writer for one run directory
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
}

impl RunLog {
    /// Create a fresh run directory under `runs_dir`
    pub fn create(runs_dir: &Path, algorithm: &str, dataset: &str) -> Result<Self, EngineError> {
        let stamp = chrono::Utc::now().timestamp();
        let dir = runs_dir.join(format!("run_{}_{}_{}", algorithm, dataset, stamp));
        fs::create_dir_all(&dir)?;
        tracing::info!("Run log at {}", dir.display());
        Ok(Self { dir })
    }

    /// Reuse an existing directory
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_json(&self, name: &str, value: &impl Serialize) -> Result<PathBuf, EngineError> {
        let path = self.dir.join(name);
        let text = serde_json::to_string_pretty(value)
            .map_err(|e| EngineError::Io(std::io::Error::other(e)))?;
        fs::write(&path, text)?;
        Ok(path)
    }

    /// Write code, transcript and result for one problem.
    ///
    /// The code file holds the extracted program, or the raw reply when the
    /// artifact is degraded. No code file is written without an artifact.
    pub fn record(&self, outcome: &SessionOutcome) -> Result<(), EngineError> {
        let id = &outcome.problem_id;

        if let Some(artifact) = &outcome.artifact {
            fs::write(
                self.dir.join(format!("{}_generated_code.py", id)),
                artifact.program(),
            )?;
        }

        self.write_json(&format!("{}_transcript.json", id), &outcome.transcript)?;
        self.write_json(
            &format!("{}_result.json", id),
            &json!({
                "problem_id": id,
                "status": outcome.status,
                "verdict": outcome.verdict,
                "error": outcome.error,
                "trials": outcome.trials,
            }),
        )?;

        tracing::debug!(problem = %id, "Recorded outcome");
        Ok(())
    }

    pub fn write_summary(&self, summary: &impl Serialize) -> Result<PathBuf, EngineError> {
        self.write_json("summary.json", summary)
    }
}
