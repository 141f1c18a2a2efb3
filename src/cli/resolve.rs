//! Resolve command: validate the config without building

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use crate::config::BuildConfig;

/// Validate the config and print the resolved settings as JSON
#[derive(Args, Debug)]
pub struct ResolveCommand {
    /// Print compact JSON on a single line
    #[arg(long)]
    pub compact: bool,
}

impl ResolveCommand {
    pub fn execute(&self, config_path: &Path) -> Result<()> {
        let config = BuildConfig::load(config_path)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

        let json = if self.compact {
            serde_json::to_string(&config)?
        } else {
            serde_json::to_string_pretty(&config)?
        };
        println!("{}", json);

        Ok(())
    }
}
