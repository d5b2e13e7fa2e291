//! CoE Engine Library
//!
//! Chain-of-Experts orchestration: prompted experts contribute to a shared
//! transcript, a reducer synthesizes a program, an evaluator runs it against
//! fixtures, and failing verdicts feed a reflection pass before the next
//! trial. Used by the `coe` binary and the integration tests.

/// Configuration management module
pub mod config;

/// Secret management module
pub mod secrets;

/// Text-generation providers and the retry policy
pub mod llm;

/// Code and JSON extraction from generated text
pub mod parsing;

/// Append-only comment transcript
pub mod pool;

/// Expert interface, catalog and registry
pub mod experts;

/// Expert selection policies
pub mod conductor;

/// Transcript to artifact synthesis
pub mod reducer;

/// Fixture execution and verdicts
pub mod evaluator;

/// Problem sources
pub mod store;

/// The trial loop
pub mod session;

/// Single-call solvers
pub mod baseline;

/// Run directory writer
pub mod runlog;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;
