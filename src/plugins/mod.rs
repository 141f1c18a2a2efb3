//! Plugin system
//!
//! Plugins hook into the start and end of every build. The built-in
//! [`CopyPlugin`] runs at the end of the build and copies static assets
//! into the output directory.

mod copy;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::BuildConfig;
use crate::error::{ConfigError, Result};

pub use copy::{CopyPattern, CopyPlugin};

/// Plugin hook context
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Project root directory
    pub root: PathBuf,

    /// Absolute output directory
    pub output_dir: PathBuf,
}

/// A file a plugin placed in the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    /// Output file path
    pub output_path: PathBuf,

    /// Size in bytes
    pub size: usize,
}

/// Plugin trait
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Plugin name for logging and debugging
    fn name(&self) -> &str;

    /// Called before the module graph is built
    async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
        Ok(())
    }

    /// Called after the bundle was written. Returns the assets it emitted.
    async fn build_end(&self, _ctx: &PluginContext) -> Result<Vec<AssetInfo>> {
        Ok(Vec::new())
    }
}

/// Plugin manager
pub struct PluginManager {
    plugins: Vec<Arc<dyn Plugin>>,
    context: PluginContext,
}

impl PluginManager {
    /// Create a new plugin manager
    pub fn new(context: PluginContext) -> Self {
        Self {
            plugins: Vec::new(),
            context,
        }
    }

    /// Create a manager with the plugins a config asks for
    pub fn from_config(config: &BuildConfig) -> Result<Self, ConfigError> {
        let mut manager = Self::new(PluginContext {
            root: config.root().to_path_buf(),
            output_dir: config.output_dir().to_path_buf(),
        });

        if !config.copy_patterns().is_empty() {
            manager.register(Arc::new(CopyPlugin::new(config.copy_patterns())?));
        }

        Ok(manager)
    }

    /// Register a plugin
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.push(plugin);
    }

    /// Run build_start hooks
    pub async fn run_build_start(&self) -> Result<()> {
        for plugin in &self.plugins {
            debug!("build_start: {}", plugin.name());
            plugin.build_start(&self.context).await?;
        }
        Ok(())
    }

    /// Run build_end hooks
    pub async fn run_build_end(&self) -> Result<Vec<AssetInfo>> {
        let mut assets = Vec::new();

        for plugin in &self.plugins {
            debug!("build_end: {}", plugin.name());
            assets.extend(plugin.build_end(&self.context).await?);
        }

        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Plugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        async fn build_start(&self, _ctx: &PluginContext) -> Result<()> {
            self.log.lock().push(format!("{}:start", self.name));
            Ok(())
        }

        async fn build_end(&self, ctx: &PluginContext) -> Result<Vec<AssetInfo>> {
            self.log.lock().push(format!("{}:end", self.name));
            Ok(vec![AssetInfo {
                output_path: ctx.output_dir.join(self.name),
                size: 1,
            }])
        }
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut manager = PluginManager::new(PluginContext {
            root: PathBuf::from("/app"),
            output_dir: PathBuf::from("/app/dist"),
        });
        manager.register(Arc::new(Recorder { name: "a", log: log.clone() }));
        manager.register(Arc::new(Recorder { name: "b", log: log.clone() }));

        manager.run_build_start().await.unwrap();
        let assets = manager.run_build_end().await.unwrap();

        assert_eq!(*log.lock(), ["a:start", "b:start", "a:end", "b:end"]);
        assert_eq!(assets.len(), 2);
        assert_eq!(assets[1].output_path, PathBuf::from("/app/dist/b"));
    }
}
