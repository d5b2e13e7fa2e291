//! CLI interface for CoE
//!
//! Commands and global flags, using clap's derive API.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Chain-of-Experts problem solver
///
/// Runs a team of prompted experts over optimization problems, synthesizes a
/// program, verifies it against fixtures, and reflects on failures.
#[derive(Parser, Debug)]
#[command(name = "coe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Solve one problem
    Run {
        /// Problem identifier (directory name under the dataset)
        problem_id: String,

        #[command(flatten)]
        solve: SolveArgs,
    },

    /// Solve many problems, independently and concurrently
    Batch {
        /// Comma-separated problem identifiers (default: every problem)
        #[arg(long, value_delimiter = ',')]
        problems: Vec<String>,

        /// Sessions running at the same time
        #[arg(long, default_value = "4")]
        concurrency: usize,

        #[command(flatten)]
        solve: SolveArgs,
    },

    /// List the registered experts in declaration order
    Experts,

    /// Check configuration, provider and interpreter
    Doctor,
}

/// Solving strategy
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Expert collaboration with reflection
    Coe,
    /// One-shot prompt
    Standard,
    /// One-shot prompt with step-by-step analysis
    Cot,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coe => "coe",
            Self::Standard => "standard",
            Self::Cot => "cot",
        }
    }
}

/// Options shared by `run` and `batch`
#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    /// Dataset directory holding one subdirectory per problem
    #[arg(long, value_name = "DIR")]
    pub dataset: PathBuf,

    #[arg(long, value_enum, default_value = "coe")]
    pub algorithm: Algorithm,

    /// Experts consulted per forward pass
    #[arg(long, value_name = "N")]
    pub max_collaborate: Option<usize>,

    /// Trials, counting the first one
    #[arg(long, value_name = "N")]
    pub max_trials: Option<usize>,

    /// Stop after the first synthesis, without evaluation
    #[arg(long)]
    pub no_reflection: bool,

    /// Model override for every generation call
    #[arg(long)]
    pub model: Option<String>,

    /// Comma-separated expert identifiers to restrict the team to
    #[arg(long, value_delimiter = ',')]
    pub experts: Vec<String>,

    /// Skip writing the run log
    #[arg(long)]
    pub no_log: bool,
}
