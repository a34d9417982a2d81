//! `docrel check`: validate the configuration without connecting.

use clap::Args;
use docrel_core::{CollectionKind, JoinStrategy};

use crate::config::Config;

/// Validate the configuration and show the unit order
#[derive(Debug, Args)]
pub struct CheckCommand {}

impl CheckCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        let spec = &config.spec;
        println!("Configuration OK: {}", config.config_file.display());
        println!();

        println!("Units (in run order):");
        let mut position = 1;
        for mapping in spec.ordered_collections()? {
            println!(
                "  {}. {} <- {} (key {} -> {})",
                position, mapping.table, mapping.collection, mapping.key_field, mapping.key_column
            );
            position += 1;
        }
        for merge in &spec.merges {
            println!(
                "  {}. {} -> {} <- {} ({} join{})",
                position,
                merge.name,
                merge.target_table,
                merge.main_collection,
                merge.joins.len(),
                if merge.joins.len() == 1 { "" } else { "s" }
            );
            for join in &merge.joins {
                let required = if join.required { "required" } else { "optional" };
                match &join.strategy {
                    JoinStrategy::Lookup {
                        collection,
                        local_field,
                        foreign_field,
                    } => println!(
                        "       {} ({}): {}.{} = {}",
                        join.alias, required, collection, foreign_field, local_field
                    ),
                    JoinStrategy::EdgeChain { steps, collection } => {
                        let hops: Vec<String> = steps
                            .iter()
                            .map(|s| format!("{} {:?}", s.collection, s.direction).to_lowercase())
                            .collect();
                        println!(
                            "       {} ({}): {}{}",
                            join.alias,
                            required,
                            hops.join(" -> "),
                            collection
                                .as_deref()
                                .map(|c| format!(" -> {}", c))
                                .unwrap_or_default()
                        );
                    }
                }
            }
            position += 1;
        }
        println!();

        println!("Source collections:");
        for requirement in spec.required_collections() {
            let kind = match requirement.kind {
                CollectionKind::Document => "document",
                CollectionKind::Edge => "edge",
            };
            println!("  {} ({})", requirement.name, kind);
        }
        Ok(())
    }
}
