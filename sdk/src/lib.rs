//! CoE SDK
//!
//! Shared data model and error taxonomy for the Chain-of-Experts engine.
//! Anything that crosses the boundary between the orchestrator and its
//! collaborators (problem stores, run logs, CLI) lives here.

/// Error types and handling
pub mod errors;

/// Protocol and problem types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt, ErrorKind, ErrorReport, ErrorScope, GenerationCause};
pub use types::{
    Artifact, Comment, Direction, ExpertId, Fixture, FixtureDiagnostic, FixtureStatus,
    OutputSchema, ProblemState, Verdict, VerdictKind,
};
