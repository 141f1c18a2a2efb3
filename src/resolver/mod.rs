//! Module resolution
//!
//! Extracts import specifiers from JavaScript sources and from the import
//! section of WebAssembly binaries, and resolves relative specifiers to files
//! on disk. Bare specifiers (packages) stay external.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use wasmparser::{Parser, Payload};

use crate::bundler::{strip_comments, ModuleType};
use crate::error::BundleError;

/// Regex patterns for extracting imports
static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:import|export)\s+(?:[\w$*\s{},]+?\s+from\s+)?["']([^"']+)["']|require\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

static DYNAMIC_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

/// Extensions tried, in order, when a specifier has none
const EXTENSIONS: [&str; 5] = ["js", "mjs", "cjs", "json", "wasm"];

/// An import found in a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub specifier: String,

    /// `import()` rather than a static import
    pub dynamic: bool,
}

/// Module resolver
#[derive(Debug, Default)]
pub struct Resolver;

impl Resolver {
    /// Create a new resolver
    pub fn new() -> Self {
        Self
    }

    /// Extract import/require dependencies from source code
    pub fn extract_dependencies(&self, source: &str, module_type: &ModuleType) -> Vec<Dependency> {
        if !module_type.is_js_like() {
            return Vec::new();
        }

        let source = strip_comments(source);
        let mut dependencies: Vec<Dependency> = Vec::new();
        let mut push = |specifier: &str, dynamic: bool| {
            if !dependencies.iter().any(|d| d.specifier == specifier) {
                dependencies.push(Dependency {
                    specifier: specifier.to_string(),
                    dynamic,
                });
            }
        };

        for cap in IMPORT_REGEX.captures_iter(&source) {
            if let Some(specifier) = cap.get(1).or_else(|| cap.get(2)) {
                push(specifier.as_str(), false);
            }
        }

        for cap in DYNAMIC_IMPORT_REGEX.captures_iter(&source) {
            if let Some(specifier) = cap.get(1) {
                push(specifier.as_str(), true);
            }
        }

        debug!("Found {} dependencies", dependencies.len());

        dependencies
    }

    /// Module names a WebAssembly binary imports from, in declaration order
    pub fn extract_wasm_imports(&self, bytes: &[u8], path: &Path) -> Result<Vec<Dependency>, BundleError> {
        let invalid = |e: wasmparser::BinaryReaderError| BundleError::InvalidWasm {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        };

        let mut dependencies: Vec<Dependency> = Vec::new();

        for payload in Parser::new(0).parse_all(bytes) {
            let Payload::ImportSection(imports) = payload.map_err(invalid)? else {
                continue;
            };

            for import in imports {
                let module = import.map_err(invalid)?.module;
                if !dependencies.iter().any(|d| d.specifier == module) {
                    dependencies.push(Dependency {
                        specifier: module.to_string(),
                        dynamic: false,
                    });
                }
            }
        }

        debug!("{} imports from {} module(s)", path.display(), dependencies.len());

        Ok(dependencies)
    }

    /// Resolve a specifier imported by `from`.
    ///
    /// Returns `Ok(None)` for bare specifiers, which are left external.
    pub fn resolve(&self, specifier: &str, from: &Path) -> Result<Option<PathBuf>, BundleError> {
        if !specifier.starts_with('.') && !specifier.starts_with('/') {
            debug!("Skipping bare specifier: {}", specifier);
            return Ok(None);
        }

        let base_dir = from.parent().unwrap_or(Path::new("."));

        match self.resolve_relative(specifier, base_dir) {
            Some(resolved) => {
                debug!("Resolved '{}' to {}", specifier, resolved.display());
                Ok(Some(resolved))
            }
            None => Err(BundleError::ModuleNotFound {
                specifier: specifier.to_string(),
                importer: from.to_path_buf(),
            }),
        }
    }

    fn resolve_relative(&self, specifier: &str, base_dir: &Path) -> Option<PathBuf> {
        let target = base_dir.join(specifier);

        if target.is_file() {
            return Some(target);
        }

        for ext in EXTENSIONS {
            let with_ext = append_extension(&target, ext);
            if with_ext.is_file() {
                return Some(with_ext);
            }
        }

        if target.is_dir() {
            for ext in EXTENSIONS {
                let index = target.join(format!("index.{}", ext));
                if index.is_file() {
                    return Some(index);
                }
            }
        }

        None
    }
}

/// `./lib.worker` + `js` is `./lib.worker.js`, not `./lib.js`
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}
