//! uiflow CLI - Main Entry Point
//!
//! Runs declarative browser scenarios and reports the outcome through the
//! exit code: 0 when every scenario passed, 1 when any failed, 2 when the run
//! could not be set up.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

use commands::{check, list, run};

/// uiflow - declarative end-to-end browser flows
#[derive(Parser)]
#[command(name = "uiflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = "uiflow.toml", env = "UIFLOW_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios against the application
    Run(run::RunArgs),

    /// List loaded scenarios
    List(list::ListArgs),

    /// Validate scenario files without a browser
    Check(check::CheckArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            2
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> anyhow::Result<i32> {
    let config = commands::load_config(&cli.config)?;

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.format).await,
        Commands::List(args) => list::execute(args, &config, cli.format),
        Commands::Check(args) => check::execute(args, &config),
    }
}
