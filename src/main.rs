use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;
mod db;
mod store;
mod sync;

use commands::{CheckCommand, ConfigCommand, DescribeCommand, SyncCommand};
use config::Config;

#[derive(Parser)]
#[command(name = "docrel")]
#[command(version)]
#[command(about = "Sync ArangoDB collections into relational tables", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every collection and merge mapping once
    Sync(SyncCommand),

    /// Validate the configuration
    Check(CheckCommand),

    /// Inspect the source or target store
    Describe(DescribeCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docrel=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("Use --help to see available commands");
        return Ok(());
    };

    // Load configuration
    let config = Config::load(cli.config)?;

    match command {
        Commands::Sync(cmd) => cmd.run(&config).await?,
        Commands::Check(cmd) => cmd.run(&config)?,
        Commands::Describe(cmd) => cmd.run(&config).await?,
        Commands::Config(cmd) => cmd.run(&config)?,
    }

    Ok(())
}
