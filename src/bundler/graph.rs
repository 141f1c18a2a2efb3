//! Module graph data structures

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// Unique identifier for a module
pub type ModuleId = usize;

/// Types of modules the bundler can handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleType {
    JavaScript,
    Json,
    Wasm,
    Unknown,
}

impl ModuleType {
    /// Determine module type from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "js" | "mjs" | "cjs" => ModuleType::JavaScript,
            "json" => ModuleType::Json,
            "wasm" => ModuleType::Wasm,
            _ => ModuleType::Unknown,
        }
    }

    /// Check if this is a JavaScript-like module
    pub fn is_js_like(&self) -> bool {
        matches!(self, ModuleType::JavaScript)
    }
}

/// Raw module contents
#[derive(Debug, Clone)]
pub enum ModuleSource {
    Text(String),
    Binary(Vec<u8>),
}

/// A module in the dependency graph
#[derive(Debug, Clone)]
pub struct Module {
    /// Absolute path to the module
    pub path: PathBuf,

    /// Identifier used in the bundle, relative to the project root
    pub id: String,

    pub source: ModuleSource,

    pub module_type: ModuleType,

    /// Import specifiers mapped to the module ids they resolved to
    pub resolved: HashMap<String, String>,

    /// Code after transformation
    pub transformed: Option<String>,
}

impl Module {
    /// Detect module type from path
    pub fn detect_type(path: &Path) -> ModuleType {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(ModuleType::from_extension)
            .unwrap_or(ModuleType::Unknown)
    }
}

/// An import of one module by another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    to: ModuleId,

    /// Only reached through `import()`
    dynamic: bool,
}

/// The module dependency graph
#[derive(Debug, Default)]
pub struct ModuleGraph {
    /// All modules indexed by their ID
    modules: HashMap<ModuleId, Module>,

    /// Map from path to module ID
    path_to_id: HashMap<PathBuf, ModuleId>,

    /// Dependency edges in import order
    edges: HashMap<ModuleId, Vec<Edge>>,

    /// Next available module ID
    next_id: ModuleId,
}

impl ModuleGraph {
    /// Create a new empty module graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the graph
    pub fn add_module(&mut self, module: Module) -> ModuleId {
        if let Some(&id) = self.path_to_id.get(&module.path) {
            return id;
        }

        let id = self.next_id;
        self.next_id += 1;

        self.path_to_id.insert(module.path.clone(), id);
        self.modules.insert(id, module);
        self.edges.insert(id, Vec::new());

        id
    }

    /// Add a dependency edge between modules. A static import of a module
    /// that was so far only imported dynamically makes the edge static.
    pub fn add_dependency(&mut self, from: ModuleId, to: ModuleId, dynamic: bool) {
        let Some(edges) = self.edges.get_mut(&from) else {
            return;
        };

        match edges.iter_mut().find(|e| e.to == to) {
            Some(edge) => edge.dynamic &= dynamic,
            None => edges.push(Edge { to, dynamic }),
        }
    }

    /// Modules imported by `id` other than through `import()`
    pub fn static_dependencies(&self, id: ModuleId) -> impl Iterator<Item = ModuleId> + '_ {
        self.edges
            .get(&id)
            .into_iter()
            .flatten()
            .filter(|e| !e.dynamic)
            .map(|e| e.to)
    }

    /// WebAssembly modules and every module that statically depends on one
    pub fn async_modules(&self) -> HashSet<ModuleId> {
        let mut async_modules: HashSet<ModuleId> = self
            .modules
            .iter()
            .filter(|(_, m)| m.module_type == ModuleType::Wasm)
            .map(|(&id, _)| id)
            .collect();

        loop {
            let before = async_modules.len();

            for &id in self.modules.keys() {
                if !async_modules.contains(&id)
                    && self.static_dependencies(id).any(|dep| async_modules.contains(&dep))
                {
                    async_modules.insert(id);
                }
            }

            if async_modules.len() == before {
                return async_modules;
            }
        }
    }

    /// Get module ID from path
    pub fn get_module_id(&self, path: &Path) -> Option<ModuleId> {
        self.path_to_id.get(path).copied()
    }

    /// Get a module by ID
    pub fn get_module(&self, id: ModuleId) -> Option<&Module> {
        self.modules.get(&id)
    }

    /// Get a mutable reference to a module
    pub fn get_module_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
        self.modules.get_mut(&id)
    }

    /// Get all modules reachable from a given module (BFS, import order)
    pub fn get_reachable_modules(&self, start: ModuleId) -> Vec<ModuleId> {
        let mut visited = HashSet::new();
        let mut result = Vec::new();
        let mut queue = VecDeque::new();

        queue.push_back(start);
        visited.insert(start);

        while let Some(id) = queue.pop_front() {
            result.push(id);

            if let Some(deps) = self.edges.get(&id) {
                for edge in deps {
                    if visited.insert(edge.to) {
                        queue.push_back(edge.to);
                    }
                }
            }
        }

        result
    }
}
