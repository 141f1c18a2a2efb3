//! Configuration handling
//!
//! Parses `bundle.toml` and resolves it into an immutable [`BuildConfig`].
//! Relative paths are anchored at the directory holding the config file,
//! never at the process working directory.

mod schema;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::plugins::CopyPattern;
use crate::utils::normalize_path;

pub use schema::*;

/// Default config file name
pub const CONFIG_FILE: &str = "bundle.toml";

/// Name of the built-in copy plugin
pub const COPY_PLUGIN: &str = "copy";

/// Configuration exactly as written in `bundle.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    /// Module where dependency traversal starts
    #[serde(default)]
    pub entry: String,

    /// Bundling mode
    #[serde(default)]
    pub mode: Mode,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Plugin configuration
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,

    /// Experimental features
    #[serde(default)]
    pub experiments: ExperimentsConfig,

    /// Watch mode tuning
    #[serde(default, alias = "watchOptions")]
    pub watch_options: WatchOptionsConfig,
}

impl RawConfig {
    /// Parse a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate and resolve against the directory containing the config file.
    ///
    /// Does not touch the file system beyond asking for the working directory
    /// when `base_dir` is relative.
    pub fn resolve(&self, base_dir: &Path) -> Result<BuildConfig, ConfigError> {
        let entry = self.entry.trim();
        if entry.is_empty() {
            return Err(ConfigError::EmptyEntry);
        }

        let watch = WatchSettings::try_from(&self.watch_options)?;

        let output_file = self.output.filename.trim();
        if output_file.is_empty() {
            return Err(ConfigError::EmptyOutputFile);
        }
        let escapes = Path::new(output_file)
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(ConfigError::OutputFileOutsideOutputDir(output_file.to_string()));
        }

        let root = absolute_base(base_dir)?;
        let output_dir = normalize_path(&root.join(&self.output.path));

        let copy_patterns = self.copy_patterns()?;

        let mut experiments = BTreeSet::new();
        if self.experiments.async_web_assembly {
            experiments.insert(Experiment::AsyncWebAssembly);
        }

        debug!(
            "Resolved config: root={}, output={}",
            root.display(),
            output_dir.display()
        );

        Ok(BuildConfig {
            root,
            entry: PathBuf::from(entry),
            output_dir,
            output_file: output_file.to_string(),
            mode: self.mode,
            copy_patterns,
            experiments,
            watch,
        })
    }

    /// Collect copy patterns from every `copy` plugin, in declaration order
    fn copy_patterns(&self) -> Result<Vec<String>, ConfigError> {
        let mut patterns = Vec::new();

        for plugin in &self.plugins {
            if plugin.name != COPY_PLUGIN {
                return Err(ConfigError::UnknownPlugin(plugin.name.clone()));
            }

            let options = plugin.options.clone().ok_or_else(|| ConfigError::PluginOptions {
                plugin: plugin.name.clone(),
                message: "missing `options.patterns`".to_string(),
            })?;

            let options: CopyOptions = toml::Value::Table(options)
                .try_into()
                .map_err(|e: toml::de::Error| ConfigError::PluginOptions {
                    plugin: plugin.name.clone(),
                    message: e.message().to_string(),
                })?;

            for pattern in options.patterns {
                CopyPattern::parse(&pattern)?;
                patterns.push(pattern);
            }
        }

        Ok(patterns)
    }
}

/// Make the config directory absolute without consulting the file system
fn absolute_base(base_dir: &Path) -> Result<PathBuf, ConfigError> {
    if base_dir.is_absolute() {
        return Ok(normalize_path(base_dir));
    }

    let cwd = std::env::current_dir()
        .map_err(|e| ConfigError::BaseDirUnavailable(e.to_string()))?;

    Ok(normalize_path(&cwd.join(base_dir)))
}

/// Validated, immutable build configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfig {
    root: PathBuf,
    entry: PathBuf,
    output_dir: PathBuf,
    output_file: String,
    mode: Mode,
    copy_patterns: Vec<String>,
    experiments: BTreeSet<Experiment>,
    watch: WatchSettings,
}

impl BuildConfig {
    /// Load and resolve configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let raw = RawConfig::from_toml(&content)?;

        // Root directory is the directory containing the config file
        let base_dir = path.parent().unwrap_or_else(|| Path::new(""));

        raw.resolve(base_dir)
    }

    /// Absolute directory containing the config file
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Entry path as written in the config
    pub fn entry(&self) -> &Path {
        &self.entry
    }

    /// Absolute path of the entry module
    pub fn entry_path(&self) -> PathBuf {
        normalize_path(&self.root.join(&self.entry))
    }

    /// Absolute output directory
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Bundle file name template
    pub fn output_file(&self) -> &str {
        &self.output_file
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Copy patterns in evaluation order
    pub fn copy_patterns(&self) -> &[String] {
        &self.copy_patterns
    }

    pub fn experiments(&self) -> &BTreeSet<Experiment> {
        &self.experiments
    }

    pub fn has_experiment(&self, experiment: Experiment) -> bool {
        self.experiments.contains(&experiment)
    }

    pub fn watch(&self) -> &WatchSettings {
        &self.watch
    }
}
