//! Watch command implementation

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::info;

use super::print_summary;
use crate::bundler::Bundler;
use crate::config::BuildConfig;
use crate::watch::WatchSession;

/// Build, then rebuild whenever a source file changes
#[derive(Args, Debug)]
pub struct WatchCommand {}

impl WatchCommand {
    pub async fn execute(&self, config_path: &Path) -> Result<()> {
        info!("Loading configuration from {}", config_path.display());
        let config = BuildConfig::load(config_path)
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

        let watch = *config.watch();
        let session = WatchSession::new(Bundler::new(Arc::new(config))?);

        eprintln!("{} Building project...", "→".blue());
        if let Some(result) = session.initial_build().await? {
            print_summary(&result);
        }

        eprintln!(
            "  {} Watching for changes (poll {}ms, aggregate {}ms)",
            "•".dimmed(),
            watch.poll_interval().as_millis(),
            watch.aggregate_timeout().as_millis()
        );
        eprintln!("  {} Press {} to stop\n", "•".dimmed(), "Ctrl+C".yellow());

        session.run().await?;

        Ok(())
    }
}
