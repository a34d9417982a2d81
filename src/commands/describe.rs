//! `docrel describe`: inspect either store.

use clap::{Args, Subcommand};
use docrel_core::CollectionKind;

use crate::config::Config;
use crate::db;
use crate::store::{ArangoStore, DocumentStore};

#[derive(Debug, Args)]
pub struct DescribeCommand {
    #[command(subcommand)]
    pub command: DescribeSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum DescribeSubcommand {
    /// List source collections with a sample document
    Source {
        /// Skip the sample documents
        #[arg(long)]
        no_sample: bool,
    },
    /// List target tables and their columns
    Target,
}

impl DescribeCommand {
    pub async fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            DescribeSubcommand::Source { no_sample } => describe_source(config, *no_sample).await,
            DescribeSubcommand::Target => describe_target(config).await,
        }
    }
}

async fn describe_source(config: &Config, no_sample: bool) -> Result<(), Box<dyn std::error::Error>> {
    let store = ArangoStore::new(&config.spec.source)?;
    let collections = store.collections().await?;

    println!(
        "Database {} at {}",
        config.spec.source.database,
        config.spec.source.base_url()
    );
    println!();

    if collections.is_empty() {
        println!("No collections found.");
        return Ok(());
    }

    for info in &collections {
        let kind = match info.kind {
            CollectionKind::Document => "document",
            CollectionKind::Edge => "edge",
        };
        let count = info
            .count
            .map(|c| format!("~{} documents", c))
            .unwrap_or_else(|| "count unknown".to_string());
        println!("{} ({}, {})", info.name, kind, count);

        if !no_sample {
            if let Some(sample) = store.sample(&info.name).await? {
                let pretty = serde_json::to_string_pretty(sample.as_value())?;
                for line in pretty.lines() {
                    println!("    {}", line);
                }
            }
        }
    }
    Ok(())
}

async fn describe_target(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = db::connect(&config.spec.target).await?;
    let tables = db::describe_tables(&pool).await;
    pool.close().await;
    let tables = tables?;

    println!("Target {}", config.spec.target.url);
    println!();

    if tables.is_empty() {
        println!("No tables found.");
        return Ok(());
    }

    for table in &tables {
        println!("{}", table.name);
        for column in &table.columns {
            let mut flags = Vec::new();
            if column.pk > 0 {
                flags.push("primary key");
            }
            if column.not_null {
                flags.push("not null");
            }
            let declared = if column.declared_type.is_empty() {
                "ANY"
            } else {
                column.declared_type.as_str()
            };
            if flags.is_empty() {
                println!("  {:<24} {}", column.name, declared);
            } else {
                println!("  {:<24} {} ({})", column.name, declared, flags.join(", "));
            }
        }
        println!();
    }
    Ok(())
}
