//! Error types and handling
//!
//! This module provides the error taxonomy used throughout the CoE engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints, recoverability, and the scope an error is allowed to abort.
//!
//! # Propagation
//!
//! - **Session** scope: the session cannot continue and produces no artifact
//!   (`NotFound`, `Config`).
//! - **Trial** scope: the current trial ends; the loop advances to the next
//!   trial if budget remains (`Generation`, `Synthesis`).
//! - **Local** scope: recorded where it happened and never propagated
//!   (`Execution` becomes a fixture diagnostic, `Parse` a degraded result).

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Trait for engine error extensions
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to end users and never contains provider
    /// payloads or secrets.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable by retrying later
    fn is_recoverable(&self) -> bool;

    /// Returns how far the error is allowed to propagate
    fn scope(&self) -> ErrorScope;
}

/// How far an error propagates through the trial loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorScope {
    /// Terminates the session immediately with no artifact
    Session,
    /// Terminates the current trial only
    Trial,
    /// Recovered at the point of failure
    Local,
}

/// Why a text-generation call failed after its retry budget was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationCause {
    Timeout,
    RateLimit,
    ServerError,
}

impl fmt::Display for GenerationCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationCause::Timeout => write!(f, "timeout"),
            GenerationCause::RateLimit => write!(f, "rate_limit"),
            GenerationCause::ServerError => write!(f, "server_error"),
        }
    }
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt, ErrorScope, GenerationCause};
///
/// let error = EngineError::generation(GenerationCause::Timeout, "no reply after 3 attempts");
/// assert_eq!(error.scope(), ErrorScope::Trial);
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::NotFound("prob_9999".to_string());
/// assert_eq!(fatal.scope(), ErrorScope::Session);
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Text-generation backend failure after retries
    #[error("Generation failed ({cause}): {message}")]
    Generation {
        cause: GenerationCause,
        message: String,
    },

    // Missing problem or fixtures
    #[error("Not found: {0}")]
    NotFound(String),

    // Reducer had nothing usable to synthesize from
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    // A fixture raised while executing the artifact
    #[error("Execution failed: {0}")]
    Execution(String),

    // Generated text did not have the expected shape
    #[error("Parse error: {message}")]
    Parse { message: String, raw: String },

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Shorthand for a generation failure
    pub fn generation(cause: GenerationCause, message: impl Into<String>) -> Self {
        Self::Generation {
            cause,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Synthesis(_) => ErrorKind::Synthesis,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Parse { .. } => ErrorKind::Parse,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::from(self)
    }

    /// Shorthand for a parse failure that keeps the raw text for inspection
    pub fn parse(message: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            raw: raw.into(),
        }
    }
}

/// Variant of an [`EngineError`], without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Generation,
    NotFound,
    Synthesis,
    Execution,
    Parse,
    Io,
}

/// Serializable record of an error, kept in trial and session results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    /// Set for generation failures only
    pub cause: Option<GenerationCause>,
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&EngineError> for ErrorReport {
    fn from(error: &EngineError) -> Self {
        let cause = match error {
            EngineError::Generation { cause, .. } => Some(*cause),
            _ => None,
        };
        Self {
            kind: error.kind(),
            cause,
            message: error.to_string(),
        }
    }
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Generation { cause, .. } => match cause {
                GenerationCause::Timeout => {
                    "The model took too long to respond. Raise retry.timeout_secs or try again"
                }
                GenerationCause::RateLimit => {
                    "The provider is rate limiting requests. Lower batch concurrency"
                }
                GenerationCause::ServerError => {
                    "The provider returned an error. Check your API key, model and network"
                }
            },
            Self::NotFound(_) => "Check the problem id and the dataset directory",
            Self::Synthesis(_) => "No expert produced any output to synthesize",
            Self::Execution(_) => "The generated program raised while running a fixture",
            Self::Parse { .. } => "The model output did not contain the expected block",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_) | Self::NotFound(_))
    }

    fn scope(&self) -> ErrorScope {
        match self {
            Self::Config(_) | Self::NotFound(_) | Self::Io(_) => ErrorScope::Session,
            Self::Generation { .. } | Self::Synthesis(_) => ErrorScope::Trial,
            Self::Execution(_) | Self::Parse { .. } => ErrorScope::Local,
        }
    }
}
