use clap::{Args, Subcommand, ValueEnum};

use crate::config::Config;

#[derive(Debug, Clone, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Args)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub command: ConfigSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigSubcommand {
    /// Show current configuration values
    Show {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl ConfigCommand {
    pub fn run(&self, config: &Config) -> Result<(), Box<dyn std::error::Error>> {
        match &self.command {
            ConfigSubcommand::Show { format } => {
                let settings = config.connection_settings();
                match format {
                    OutputFormat::Json => {
                        let settings: serde_json::Map<String, serde_json::Value> = settings
                            .into_iter()
                            .map(|(key, value)| Ok((key.to_string(), serde_json::to_value(value)?)))
                            .collect::<Result<_, serde_json::Error>>()?;
                        let output = serde_json::json!({
                            "config_file": config.config_file,
                            "settings": settings,
                            "collections": config.spec.collections.len(),
                            "merges": config.spec.merges.len(),
                        });
                        println!("{}", serde_json::to_string_pretty(&output)?);
                    }
                    OutputFormat::Text => {
                        println!("Configuration");
                        println!("=============\n");
                        println!("Config file: {}", config.config_file.display());
                        println!();

                        for (key, setting) in settings {
                            println!("{}: {}", key, setting.value);
                            println!("  source: {}", setting.source);
                        }
                        println!();
                        println!("collections: {}", config.spec.collections.len());
                        println!("merges: {}", config.spec.merges.len());
                    }
                }
                Ok(())
            }
        }
    }
}
