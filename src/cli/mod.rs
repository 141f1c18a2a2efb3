//! Command-line interface
//!
//! Provides the main CLI structure using clap with subcommands for:
//! - `build`: Build the bundle once
//! - `watch`: Build, then rebuild on every change
//! - `resolve`: Print the resolved configuration
//! - `init`: Project scaffolding

mod build;
mod init;
mod resolve;
mod watch;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;

pub use build::{print_summary, BuildCommand};
pub use init::InitCommand;
pub use resolve::ResolveCommand;
pub use watch::WatchCommand;

use crate::config::CONFIG_FILE;

/// Bundle WebAssembly-backed frontend apps from a declarative bundle.toml
#[derive(Parser, Debug)]
#[command(name = "wasm-bundle")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the bundle.toml config file
    #[arg(short, long, global = true, env = "WASM_BUNDLE_CONFIG", default_value = CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the project once
    Build(BuildCommand),

    /// Build, then rebuild whenever a source file changes
    Watch(WatchCommand),

    /// Validate the config and print the resolved settings as JSON
    Resolve(ResolveCommand),

    /// Initialize a new project
    Init(InitCommand),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<()> {
        if !matches!(self.command, Commands::Resolve(_)) {
            print_banner();
        }

        match &self.command {
            Commands::Build(cmd) => cmd.execute(&self.config).await,
            Commands::Watch(cmd) => cmd.execute(&self.config).await,
            Commands::Resolve(cmd) => cmd.execute(&self.config),
            Commands::Init(cmd) => cmd.execute().await,
        }
    }
}

/// Print the banner
fn print_banner() {
    eprintln!(
        "\n{} {} {}\n",
        "⚡".cyan(),
        "wasm-bundle".bold().cyan(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
}
