// CoE engine
// Main entry point for the coe binary

use clap::Parser;
use coe_engine::cli::{Cli, Command};
use coe_engine::config::Config;
use coe_engine::handlers::{
    handle_batch, handle_doctor, handle_experts, handle_run, OutputFormat,
};
use coe_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("CoE v{} ({} - {})", version, commit, timestamp);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    match cli.command {
        Command::Run { problem_id, solve } => {
            tracing::info!("Solving {} with {}", problem_id, solve.algorithm.as_str());
            handle_run(problem_id, solve, &config, format).await
        }

        Command::Batch {
            problems,
            concurrency,
            solve,
        } => handle_batch(problems, concurrency, solve, &config, format).await,

        Command::Experts => handle_experts(format),

        Command::Doctor => {
            tracing::info!("Running diagnostics...");
            handle_doctor(&config, format).await
        }
    }
}
