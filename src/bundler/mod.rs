//! Core bundler implementation
//!
//! Builds the module graph from the entry, transforms every module and
//! writes a single bundle plus any emitted WebAssembly binaries into the
//! output directory. Plugins run before and after.

mod emit;
mod graph;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{BuildConfig, Experiment};
use crate::error::{BundleError, ConfigError, Result};
use crate::plugins::{AssetInfo, PluginManager};
use crate::resolver::Resolver;
use crate::transform::{EmittedFile, Transformer};
use crate::utils;

pub use emit::{minify_code, output_file_name, render_bundle, strip_comments, CHUNK_NAME};
pub use graph::{Module, ModuleGraph, ModuleId, ModuleSource, ModuleType};

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// The emitted bundle
    pub bundle: AssetInfo,

    /// WebAssembly binaries emitted next to the bundle
    pub wasm: Vec<AssetInfo>,

    /// Assets placed by plugins
    pub assets: Vec<AssetInfo>,

    /// Number of modules in the bundle
    pub modules: usize,

    pub duration: Duration,
}

impl BuildResult {
    /// Every file the build wrote
    pub fn files(&self) -> impl Iterator<Item = &AssetInfo> {
        std::iter::once(&self.bundle)
            .chain(&self.wasm)
            .chain(&self.assets)
    }
}

/// The main bundler
pub struct Bundler {
    /// Resolved configuration
    config: Arc<BuildConfig>,

    /// Module resolver
    resolver: Resolver,

    /// Code transformer
    transformer: Transformer,

    /// Plugins from the config
    plugins: PluginManager,

    /// Module graph of the current build
    graph: Arc<RwLock<ModuleGraph>>,
}

impl Bundler {
    /// Create a new bundler instance
    pub fn new(config: Arc<BuildConfig>) -> Result<Self> {
        let plugins = PluginManager::from_config(&config)?;

        Ok(Self {
            transformer: Transformer::new(config.clone()),
            resolver: Resolver::new(),
            plugins,
            config,
            graph: Arc::new(RwLock::new(ModuleGraph::new())),
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Build the project. Safe to call repeatedly; each call starts from a fresh graph.
    pub async fn build(&self) -> Result<BuildResult> {
        let start = Instant::now();

        let entry = self.config.entry_path();
        if !entry.is_file() {
            return Err(ConfigError::EntryNotFound(entry).into());
        }

        *self.graph.write() = ModuleGraph::new();

        self.plugins.run_build_start().await?;

        // 1. Build the module graph from the entry
        info!("Building module graph from {}", self.config.entry().display());
        let entry_id = self.process_module(&entry).await?;

        // 2. Transform all modules
        info!("Transforming modules...");
        let order = self.graph.read().get_reachable_modules(entry_id);
        let emitted = self.transform_modules(&order)?;

        // 3. Write the bundle, with WebAssembly binaries next to it
        info!("Writing bundle...");
        let (bundle, wasm) = self.write_bundle(&order, &emitted)?;

        // 4. Plugins (copy)
        let assets = self.plugins.run_build_end().await?;

        let duration = start.elapsed();
        debug!("Build completed in {:?}", duration);

        Ok(BuildResult {
            bundle,
            wasm,
            assets,
            modules: order.len(),
            duration,
        })
    }

    /// Process a single module and its dependencies
    ///
    /// Uses Box::pin for async recursion to avoid infinite type size issues
    async fn process_module(&self, path: &Path) -> Result<ModuleId> {
        if let Some(id) = self.graph.read().get_module_id(path) {
            return Ok(id);
        }

        let module_type = Module::detect_type(path);

        let bytes = fs::read(path).map_err(|source| BundleError::ReadModule {
            path: path.to_path_buf(),
            source,
        })?;

        let (source, dependencies) = match module_type {
            ModuleType::Wasm => {
                if !self.config.has_experiment(Experiment::AsyncWebAssembly) {
                    return Err(BundleError::WasmExperimentDisabled(path.to_path_buf()).into());
                }
                let dependencies = self.resolver.extract_wasm_imports(&bytes, path)?;
                (ModuleSource::Binary(bytes), dependencies)
            }
            _ => {
                let text = String::from_utf8(bytes).map_err(|e| BundleError::ReadModule {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
                })?;
                let dependencies = self.resolver.extract_dependencies(&text, &module_type);
                (ModuleSource::Text(text), dependencies)
            }
        };

        let module_id = self.graph.write().add_module(Module {
            path: path.to_path_buf(),
            id: utils::module_id(self.config.root(), path),
            source,
            module_type,
            resolved: Default::default(),
            transformed: None,
        });

        // Process dependencies recursively (Box::pin needed for async recursion)
        for dep in dependencies {
            let Some(resolved_path) = self.resolver.resolve(&dep.specifier, path)? else {
                continue;
            };
            let resolved_path = utils::normalize_path(&resolved_path);

            let dep_id = Box::pin(self.process_module(&resolved_path)).await?;

            let mut graph = self.graph.write();
            graph.add_dependency(module_id, dep_id, dep.dynamic);

            let dep_module_id = graph.get_module(dep_id).map(|m| m.id.clone());
            if let (Some(dep_module_id), Some(module)) = (dep_module_id, graph.get_module_mut(module_id)) {
                module.resolved.insert(dep.specifier, dep_module_id);
            }
        }

        Ok(module_id)
    }

    /// Transform the modules in `order`, collecting files to emit
    fn transform_modules(&self, order: &[ModuleId]) -> Result<Vec<EmittedFile>> {
        let mut emitted = Vec::new();
        let mut graph = self.graph.write();

        for &id in order {
            let Some(module) = graph.get_module_mut(id) else {
                continue;
            };

            let output = self.transformer.transform(module)?;
            module.transformed = Some(output.code);
            emitted.extend(output.emitted);
        }

        Ok(emitted)
    }

    /// Render and write the bundle. The runtime fetches WebAssembly binaries
    /// relative to the bundle's URL, so they go into the bundle's directory.
    fn write_bundle(
        &self,
        order: &[ModuleId],
        emitted: &[EmittedFile],
    ) -> Result<(AssetInfo, Vec<AssetInfo>)> {
        let code = render_bundle(&self.graph.read(), order, self.config.mode());

        let filename = output_file_name(self.config.output_file(), &code);
        let output_path = self.config.output_dir().join(&filename);
        let bundle_dir = output_path.parent().unwrap_or(self.config.output_dir());

        fs::create_dir_all(bundle_dir).map_err(|source| BundleError::Write {
            path: bundle_dir.to_path_buf(),
            source,
        })?;

        let mut wasm = Vec::new();
        for file in emitted {
            let path = bundle_dir.join(&file.file_name);
            write_file(&path, &file.content)?;
            wasm.push(AssetInfo {
                output_path: path,
                size: file.content.len(),
            });
        }

        write_file(&output_path, code.as_bytes())?;

        let bundle = AssetInfo {
            output_path,
            size: code.len(),
        };

        Ok((bundle, wasm))
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<(), BundleError> {
    fs::write(path, content).map_err(|source| BundleError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::RawConfig;
    use crate::error::{CopyError, Error};

    const WASM: &str = "\0asm\x01\x00\x00\x00";

    fn project(config: &str, files: &[(&str, &str)]) -> (tempfile::TempDir, Bundler) {
        let dir = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let config = RawConfig::from_toml(config).unwrap().resolve(dir.path()).unwrap();
        let bundler = Bundler::new(Arc::new(config)).unwrap();
        (dir, bundler)
    }

    const APP: &str = r#"
entry = "bootstrap.js"
mode = "development"

[output]
path = "dist"
filename = "bootstrap.js"

[[plugins]]
name = "copy"
options = { patterns = ["index.html"] }

[experiments]
async_web_assembly = true
"#;

    #[tokio::test]
    async fn test_build_writes_bundle_and_copies_assets() {
        let (dir, bundler) = project(
            APP,
            &[
                ("bootstrap.js", "import(\"./index.js\");"),
                ("index.js", "import * as wasm from './pkg/app_bg.wasm';\nconst cfg = require('./cfg.json');"),
                ("cfg.json", "{\"debug\": true}"),
                ("pkg/app_bg.wasm", WASM),
                ("index.html", "<script src=\"./bootstrap.js\"></script>\n"),
            ],
        );

        let result = bundler.build().await.unwrap();
        let dist = dir.path().join("dist");

        assert_eq!(result.modules, 4);
        assert_eq!(result.bundle.output_path, dist.join("bootstrap.js"));
        assert_eq!(
            fs::read(dist.join("index.html")).unwrap(),
            fs::read(dir.path().join("index.html")).unwrap()
        );
        assert_eq!(result.assets.len(), 1);

        assert_eq!(result.wasm.len(), 1);
        assert_eq!(fs::read(&result.wasm[0].output_path).unwrap(), WASM.as_bytes());

        let bundle = fs::read_to_string(dist.join("bootstrap.js")).unwrap();
        assert!(bundle.contains("__wasm_bundle_wasm__[\"./pkg/app_bg.wasm\"]"));
        assert!(bundle.contains("__wasm_bundle_async__[\"./index.js\"] = [\"./pkg/app_bg.wasm\"];"));
        assert!(bundle.contains("var wasm = require(\"./pkg/app_bg.wasm\");"));
        assert!(bundle.contains("require(\"./cfg.json\")"));
        assert!(bundle.contains("__wasm_bundle_import__(\"./bootstrap.js\")"));
    }

    #[tokio::test]
    async fn test_rebuild_is_repeatable() {
        let (_dir, bundler) = project(
            APP,
            &[("bootstrap.js", "console.log(1);"), ("index.html", "<html></html>")],
        );

        let first = bundler.build().await.unwrap();
        let first_code = fs::read(&first.bundle.output_path).unwrap();
        let second = bundler.build().await.unwrap();

        assert_eq!(first.modules, second.modules);
        assert_eq!(fs::read(&second.bundle.output_path).unwrap(), first_code);
    }

    #[tokio::test]
    async fn test_missing_entry_is_a_configuration_error() {
        let (_dir, bundler) = project(APP, &[("index.html", "")]);

        let err = bundler.build().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(ConfigError::EntryNotFound(_))));
    }

    #[tokio::test]
    async fn test_wasm_import_without_experiment_fails_the_build() {
        let (dir, bundler) = project(
            "entry = \"index.js\"\n",
            &[("index.js", "import * as wasm from './app.wasm';"), ("app.wasm", WASM)],
        );

        let err = bundler.build().await.unwrap_err();
        assert!(matches!(err, Error::Bundle(BundleError::WasmExperimentDisabled(_))));
        assert!(!dir.path().join("dist/main.js").exists());
    }

    #[tokio::test]
    async fn test_wasm_is_written_next_to_a_nested_bundle() {
        let (dir, bundler) = project(
            "entry = \"index.js\"\noutput = { filename = \"js/[name].js\" }\n[experiments]\nasync_web_assembly = true\n",
            &[("index.js", "import * as wasm from './app.wasm';"), ("app.wasm", WASM)],
        );

        let result = bundler.build().await.unwrap();
        let js = dir.path().join("dist/js");

        assert_eq!(result.bundle.output_path, js.join("main.js"));
        assert_eq!(result.wasm.len(), 1);
        assert_eq!(result.wasm[0].output_path.parent(), Some(js.as_path()));
        assert_eq!(result.files().count(), 2);
    }

    #[tokio::test]
    async fn test_commented_out_import_is_not_followed() {
        let (_dir, bundler) = project(
            "entry = \"index.js\"\n",
            &[("index.js", "// import old from './old';\nconsole.log(1);")],
        );

        let result = bundler.build().await.unwrap();
        assert_eq!(result.modules, 1);
    }

    #[tokio::test]
    async fn test_unmatched_copy_pattern_fails_the_build() {
        let (_dir, bundler) = project(
            "entry = \"index.js\"\n[[plugins]]\nname = \"copy\"\noptions = { patterns = [\"index.html\"] }\n",
            &[("index.js", "")],
        );

        let err = bundler.build().await.unwrap_err();
        assert!(matches!(err, Error::Copy(CopyError::NoMatches(_))));
    }

    #[tokio::test]
    async fn test_production_bundle_with_content_hash() {
        let (dir, bundler) = project(
            "entry = \"src/index.js\"\noutput = { filename = \"[name].[contenthash].js\" }\n",
            &[("src/index.js", "// hello\nexport const answer = 42;\n")],
        );

        let result = bundler.build().await.unwrap();
        let name = result.bundle.output_path.file_name().unwrap().to_string_lossy().to_string();

        assert!(name.starts_with("main."));
        assert_eq!(name.len(), "main..js".len() + 16);
        assert!(result.bundle.output_path.starts_with(dir.path().join("dist")));

        let code = fs::read_to_string(&result.bundle.output_path).unwrap();
        assert!(!code.contains("// hello"));
    }
}
