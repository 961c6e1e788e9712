//! WaterMill CLI
//!
//! Runs join jobs described in YAML over JSON-lines files.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use watermill::config::WaterMillConfig;
use watermill::telemetry::init_tracing;
use watermill_cli::commands::{DescribeCommand, RunCommand};
use watermill_cli::CliResult;

#[derive(Parser)]
#[command(
    name = "watermill",
    version,
    about = "WaterMill - stream joins and windowed processing over JSON-lines files"
)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "WATERMILL_CONFIG",
        value_name = "FILE",
        help = "Path to configuration file"
    )]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job
    #[command(name = "run", about = "Run a join job and write its results")]
    Run(RunCommand),

    /// Describe a job
    #[command(name = "describe", about = "Print the join tree of a job")]
    Describe(DescribeCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let mut config = WaterMillConfig::load(cli.config)?;
    if cli.verbose {
        config.logging.level = "watermill=debug,watermill_cli=debug,info".to_string();
    }
    init_tracing(&config.logging)?;

    match cli.command {
        Commands::Run(command) => command.execute(&config).await,
        Commands::Describe(command) => command.execute(),
    }
}
