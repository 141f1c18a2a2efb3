//! Build command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::bundler::{BuildResult, Bundler};
use crate::config::BuildConfig;
use crate::plugins::AssetInfo;
use crate::utils::{format_duration, format_size};

/// Build the project once
#[derive(Args, Debug)]
pub struct BuildCommand {}

impl BuildCommand {
    pub async fn execute(&self, config_path: &Path) -> Result<()> {
        info!("Loading configuration from {}", config_path.display());
        let config = BuildConfig::load(config_path)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

        eprintln!(
            "{} Building project ({})...",
            "→".blue(),
            config.mode().to_string().cyan()
        );

        let bundler = Bundler::new(Arc::new(config))?;
        let result = bundler.build().await?;

        print_summary(&result);

        Ok(())
    }
}

/// Print the files a build produced
pub fn print_summary(result: &BuildResult) {
    eprintln!(
        "\n{} Built {} module(s) in {}\n",
        "✓".green().bold(),
        result.modules,
        format_duration(result.duration)
    );

    for AssetInfo { output_path, size } in result.files() {
        eprintln!(
            "  {} {} {}",
            "•".dimmed(),
            output_path.display().to_string().cyan(),
            format_size(*size).dimmed()
        );
    }

    eprintln!();
}
