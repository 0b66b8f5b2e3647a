use anyhow::Result;
use clap::Parser;
use gkfs_harness::cli::{Cli, Commands};
use gkfs_harness::{commands, HarnessConfig};
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON records
    let use_color = atty::is(atty::Stream::Stderr);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_target(true)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = &result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }

    result
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.apply(HarnessConfig::load(cli.config.as_deref())?);

    match cli.cmd {
        Commands::Daemon(args) => commands::cmd_daemon(args, config).await,
        Commands::Io(args) => commands::cmd_io(args, config).await,
        Commands::Decode(args) => commands::cmd_decode(args).await,
        Commands::Endpoint(args) => commands::cmd_endpoint(args, config).await,
    }
}
