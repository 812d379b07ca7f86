use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;
mod scenario;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so JSON output stays parseable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("delegation_ledger=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Urn(args) => commands::urn::run(args, cli.format),
        Commands::Classify(args) => commands::classify::run(args, cli.format),
        Commands::Plan(args) => commands::plan::run(args, cli.format).await,
        Commands::Apply(args) => commands::apply::run(args, cli.format).await,
    }
}
