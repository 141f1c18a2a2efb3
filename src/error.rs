//! Error types
//!
//! Every failure falls into one of three families: the configuration is
//! unusable, the copy step failed, or the bundler itself failed.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error returned by builds
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Copy(#[from] CopyError),

    #[error(transparent)]
    Bundle(#[from] BundleError),
}

/// The configuration is malformed or incomplete. The build never starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("entry path must not be empty")]
    EmptyEntry,

    #[error("entry points to non-existent file: {0}")]
    EntryNotFound(PathBuf),

    #[error("output filename must not be empty")]
    EmptyOutputFile,

    #[error("output filename must stay inside the output directory: {0}")]
    OutputFileOutsideOutputDir(String),

    #[error("watch_options.poll must be greater than 0 (got {0})")]
    InvalidPollInterval(i64),

    #[error("watch_options.aggregate_timeout must not be negative (got {0})")]
    InvalidAggregateTimeout(i64),

    #[error("cannot resolve output path: base directory unavailable ({0})")]
    BaseDirUnavailable(String),

    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    #[error("invalid options for plugin '{plugin}': {message}")]
    PluginOptions { plugin: String, message: String },

    #[error("invalid copy pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// An asset could not be copied into the output directory
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("pattern '{0}' did not match any files")]
    NoMatches(String),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The bundler failed while building the module graph or writing output
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to read module {path}: {source}")]
    ReadModule {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot resolve '{specifier}' from {importer}")]
    ModuleNotFound { specifier: String, importer: PathBuf },

    #[error("no loader for {0}: only JavaScript, JSON and WebAssembly modules are supported")]
    UnsupportedModule(PathBuf),

    #[error("invalid JSON in {path}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "{0} is a WebAssembly module but experiments.async_web_assembly is not enabled"
    )]
    WasmExperimentDisabled(PathBuf),

    #[error("{path} is not a valid WebAssembly binary: {message}")]
    InvalidWasm { path: PathBuf, message: String },

    #[error("cannot bundle {path}: unsupported module syntax `{statement}`")]
    UnsupportedSyntax { path: PathBuf, statement: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
