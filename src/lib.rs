//! wasm-bundle library
//!
//! Resolves a declarative `bundle.toml` into a validated [`BuildConfig`] and
//! bundles a WebAssembly-backed frontend app from it.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;
pub mod plugins;
pub mod resolver;
pub mod transform;
pub mod utils;
pub mod watch;

pub use bundler::Bundler;
pub use cli::Cli;
pub use config::{BuildConfig, RawConfig};
pub use error::{BundleError, ConfigError, CopyError, Error, Result};
