//! `docrel sync`: run every unit once.

use clap::Args;

use crate::config::Config;
use crate::sync::{RunReport, SyncEngine, SyncError};

/// Copy documents into the target tables
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Schema for target tables that are not already qualified
    #[arg(long)]
    schema: Option<String>,
}

impl SyncCommand {
    pub async fn run(&self, config: &Config) -> Result<(), SyncError> {
        let engine = SyncEngine::connect(config.spec.clone()).await?;

        let spec = engine.spec();
        println!(
            "Syncing {} ({}) -> {}",
            spec.source.database,
            spec.source.base_url(),
            spec.target.url
        );
        println!();

        let result = engine.run(self.schema.as_deref()).await;
        engine.close().await;
        let report = result?;

        print_report(&report);
        Ok(())
    }
}

fn print_report(report: &RunReport) {
    for unit in &report.units {
        println!(
            "  ✓ {} -> {}: {} scanned, {} inserted, {} updated, {} unchanged, {} skipped",
            unit.unit,
            unit.table,
            unit.scanned,
            unit.inserted,
            unit.updated,
            unit.unchanged,
            unit.skipped
        );
    }
    println!();
    println!(
        "Sync complete: {} unit{}, {} document{} scanned, {} row{} written.",
        report.units.len(),
        plural(report.units.len()),
        report.scanned(),
        plural(report.scanned()),
        report.written(),
        plural(report.written())
    );
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
