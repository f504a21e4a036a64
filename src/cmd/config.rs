//! `kennel config`: show or validate the effective configuration.

use anyhow::{Context, Result};
use kennel::config::CONFIG_FILE_NAME;

use super::load_config;
use crate::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let config = load_config(cli)?;

    match command {
        None | Some(ConfigCommands::Show) => {
            let source = match &cli.config {
                Some(path) => path.display().to_string(),
                None if std::path::Path::new(CONFIG_FILE_NAME).exists() => {
                    CONFIG_FILE_NAME.to_string()
                }
                None => "defaults".to_string(),
            };
            println!("Configuration ({} + environment):", source);
            println!();

            let mut shown = config.clone();
            if shown.store.anon_key.is_some() {
                shown.store.anon_key = Some("********".to_string());
            }
            let rendered =
                toml::to_string_pretty(&shown).context("Failed to render configuration")?;
            print!("{}", rendered);
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid");
            } else {
                println!("Configuration warnings:");
                for warning in &warnings {
                    println!("  - {}", warning);
                }
            }
        }
    }
    Ok(())
}
