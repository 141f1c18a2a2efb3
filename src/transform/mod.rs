//! Code transformation
//!
//! Turns every module in the graph into a function body for the bundle
//! runtime. WebAssembly modules additionally produce a binary that is
//! emitted next to the bundle and fetched at runtime.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::bundler::{strip_comments, Module, ModuleSource, ModuleType};
use crate::config::{BuildConfig, Experiment};
use crate::error::BundleError;
use crate::utils::hash_content;

static REQUIRE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"require\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

static DYNAMIC_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"import\s*\(\s*["']([^"']+)["']\s*\)"#).unwrap()
});

static STATIC_IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bimport\s+(?:([\w$*\s{},]+?)\s+from\s+)?["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_STAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s*\*\s*(?:as\s+([\w$]+)\s+)?from\s*["']([^"']+)["'][ \t]*;?"#).unwrap()
});

static EXPORT_LIST_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bexport\s*\{([^}]*)\}(?:\s*from\s*["']([^"']+)["'])?[ \t]*;?"#).unwrap()
});

static EXPORT_DESTRUCTURING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+(const|let|var)\s*(\{[^{}\[\]=]*\}|\[[^{}\[\]=]*\])\s*=").unwrap()
});

static EXPORT_DECLARATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bexport\s+((?:async\s+)?function\s*\*?|class|const|let|var)\s*([\w$]+)").unwrap()
});

static EXPORT_DEFAULT_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bexport\s+default\s+").unwrap());

/// A statement-level `import`/`export` left after lowering
static MODULE_SYNTAX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?m)^[ \t]*(?:import|export)\b[ \t]*[\w$*{\["'`].*$"#).unwrap()
});

/// Every WebAssembly binary starts with `\0asm`
const WASM_MAGIC: &[u8; 4] = b"\0asm";

/// A file the bundler writes next to the bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedFile {
    /// File name relative to the bundle's directory
    pub file_name: String,

    pub content: Vec<u8>,
}

/// Result of transforming one module
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub emitted: Option<EmittedFile>,
}

impl TransformOutput {
    fn code(code: String) -> Self {
        Self {
            code,
            emitted: None,
        }
    }
}

/// Module transformer
pub struct Transformer {
    config: Arc<BuildConfig>,
}

impl Transformer {
    /// Create a new transformer
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self { config }
    }

    /// Transform a module based on its type
    pub fn transform(&self, module: &Module) -> Result<TransformOutput, BundleError> {
        match (&module.module_type, &module.source) {
            (ModuleType::JavaScript, ModuleSource::Text(source)) => self
                .transform_javascript(source, &module.resolved, &module.path)
                .map(TransformOutput::code),
            (ModuleType::Json, ModuleSource::Text(source)) => {
                self.transform_json(source, &module.path).map(TransformOutput::code)
            }
            (ModuleType::Wasm, ModuleSource::Binary(bytes)) => {
                self.transform_wasm(bytes, &module.resolved, &module.path)
            }
            _ => Err(BundleError::UnsupportedModule(module.path.clone())),
        }
    }

    /// Point `require()` and `import()` at bundled module ids and lower
    /// module syntax to `require`/`exports`
    fn transform_javascript(
        &self,
        source: &str,
        resolved: &HashMap<String, String>,
        path: &Path,
    ) -> Result<String, BundleError> {
        debug!("Transforming JavaScript: {}", path.display());

        let source = strip_comments(source);

        let code = REQUIRE_REGEX.replace_all(&source, |caps: &Captures| {
            match resolved.get(&caps[1]) {
                Some(id) => format!("require(\"{}\")", id),
                None => caps[0].to_string(),
            }
        });

        let code = DYNAMIC_IMPORT_REGEX.replace_all(&code, |caps: &Captures| {
            match resolved.get(&caps[1]) {
                Some(id) => format!("__wasm_bundle_import__(\"{}\")", id),
                None => caps[0].to_string(),
            }
        });

        let code = lower_module_syntax(&code, resolved);

        if let Some(statement) = MODULE_SYNTAX_REGEX.find(&code) {
            return Err(BundleError::UnsupportedSyntax {
                path: path.to_path_buf(),
                statement: statement.as_str().trim().to_string(),
            });
        }

        Ok(code)
    }

    /// Transform JSON to JS module
    fn transform_json(&self, source: &str, path: &Path) -> Result<String, BundleError> {
        debug!("Transforming JSON: {}", path.display());

        serde_json::from_str::<serde_json::Value>(source).map_err(|source| {
            BundleError::InvalidJson {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Ok(format!("module.exports = {};", source.trim()))
    }

    /// Emit the binary and describe how the runtime instantiates it: the
    /// file to fetch and the module providing each import namespace
    fn transform_wasm(
        &self,
        bytes: &[u8],
        resolved: &HashMap<String, String>,
        path: &Path,
    ) -> Result<TransformOutput, BundleError> {
        debug!("Transforming WebAssembly: {}", path.display());

        if !self.config.has_experiment(Experiment::AsyncWebAssembly) {
            return Err(BundleError::WasmExperimentDisabled(path.to_path_buf()));
        }

        if !bytes.starts_with(WASM_MAGIC) {
            return Err(BundleError::InvalidWasm {
                path: path.to_path_buf(),
                message: "missing \\0asm header".to_string(),
            });
        }

        let file_name = format!("{}.module.wasm", hash_content(bytes));

        let imports: serde_json::Map<String, serde_json::Value> = resolved
            .iter()
            .map(|(specifier, id)| (specifier.clone(), serde_json::Value::from(id.as_str())))
            .collect();

        let code = serde_json::json!({ "file": file_name, "imports": imports }).to_string();

        Ok(TransformOutput {
            code,
            emitted: Some(EmittedFile {
                file_name,
                content: bytes.to_vec(),
            }),
        })
    }
}

/// Rewrite static `import`/`export` statements into `require` and `exports`
/// so the module body can run inside a runtime function wrapper.
fn lower_module_syntax(code: &str, resolved: &HashMap<String, String>) -> String {
    let require = |specifier: &str| {
        let id = resolved.get(specifier).map(String::as_str).unwrap_or(specifier);
        format!("require(\"{}\")", id)
    };

    let code = STATIC_IMPORT_REGEX.replace_all(code, |caps: &Captures| {
        let module = require(&caps[2]);
        match caps.get(1) {
            Some(clause) => import_bindings(clause.as_str(), &module),
            None => format!("{};", module),
        }
    });

    let mut has_exports = false;

    let code = EXPORT_STAR_REGEX.replace_all(&code, |caps: &Captures| {
        has_exports = true;
        let module = require(&caps[2]);
        match caps.get(1) {
            Some(namespace) => format!("exports.{} = {};", namespace.as_str(), module),
            None => format!(
                "(function (m) {{ Object.keys(m).forEach(function (k) {{ if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, k)) exports[k] = m[k]; }}); }})({});",
                module
            ),
        }
    });

    // (exported name, value) pairs assigned once the body has run
    let mut exports: Vec<(String, String)> = Vec::new();

    let code = EXPORT_LIST_REGEX.replace_all(&code, |caps: &Captures| {
        let from = caps.get(2).map(|m| require(m.as_str()));
        for spec in caps[1].split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (local, name) = split_alias(spec);
            let value = match &from {
                Some(module) => format!("{}.{}", module, local),
                None => local.to_string(),
            };
            exports.push((name.to_string(), value));
        }
        String::new()
    });

    let code = EXPORT_DESTRUCTURING_REGEX.replace_all(&code, |caps: &Captures| {
        for name in pattern_bindings(&caps[2]) {
            exports.push((name.to_string(), name.to_string()));
        }
        format!("{} {} =", &caps[1], &caps[2])
    });

    let code = EXPORT_DECLARATION_REGEX.replace_all(&code, |caps: &Captures| {
        exports.push((caps[2].to_string(), caps[2].to_string()));
        format!("{} {}", caps[1].trim_end(), &caps[2])
    });

    has_exports |= EXPORT_DEFAULT_REGEX.is_match(&code);
    let code = EXPORT_DEFAULT_REGEX.replace_all(&code, "exports.default = ");

    if exports.is_empty() && !has_exports {
        return code.into_owned();
    }

    let mut lowered = String::from("Object.defineProperty(exports, \"__esModule\", { value: true });\n");
    lowered.push_str(&code);
    for (name, value) in exports {
        lowered.push_str(&format!("\nexports.{} = {};", name, value));
    }
    lowered
}

/// Variable declarations for an import clause such as `a, { b as c }`
fn import_bindings(clause: &str, module: &str) -> String {
    let clause = clause.trim();
    let (default, rest) = if clause.starts_with('{') || clause.starts_with('*') {
        (None, Some(clause))
    } else {
        match clause.split_once(',') {
            Some((default, rest)) => (Some(default.trim()), Some(rest.trim())),
            None => (Some(clause), None),
        }
    };

    let mut statements = Vec::new();

    if let Some(name) = default {
        statements.push(format!(
            "var {0} = {1}; {0} = {0} && {0}.__esModule ? {0}.default : {0};",
            name, module
        ));
    }

    match rest {
        Some(namespace) if namespace.starts_with('*') => {
            let name = namespace.split_whitespace().last().unwrap_or_default();
            statements.push(format!("var {} = {};", name, module));
        }
        Some(named) => {
            let bindings = named
                .trim_start_matches('{')
                .trim_end_matches('}')
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|spec| match split_alias(spec) {
                    (imported, local) if imported == local => local.to_string(),
                    (imported, local) => format!("{}: {}", imported, local),
                })
                .collect::<Vec<_>>()
                .join(", ");
            statements.push(format!("var {{ {} }} = {};", bindings, module));
        }
        None => {}
    }

    statements.join(" ")
}

/// Names bound by a flat destructuring pattern: `{ a, b: c, ...d }` binds
/// `a`, `c` and `d`; `[a, , b]` binds `a` and `b`
fn pattern_bindings(pattern: &str) -> Vec<&str> {
    pattern[1..pattern.len() - 1]
        .split(',')
        .map(|item| {
            let item = item.trim().trim_start_matches("...");
            item.rsplit(':').next().unwrap_or(item).trim()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// `a as b` is `("a", "b")`
fn split_alias(spec: &str) -> (&str, &str) {
    match spec.split_once(" as ") {
        Some((original, alias)) => (original.trim(), alias.trim()),
        None => (spec, spec),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::PathBuf;

    use crate::config::RawConfig;

    fn transformer(async_wasm: bool) -> Transformer {
        let raw = RawConfig::from_toml(&format!(
            "entry = \"bootstrap.js\"\n[experiments]\nasync_web_assembly = {}\n",
            async_wasm
        ))
        .unwrap();
        Transformer::new(Arc::new(raw.resolve(Path::new("/app")).unwrap()))
    }

    fn module(path: &str, source: ModuleSource, resolved: &[(&str, &str)]) -> Module {
        Module {
            path: PathBuf::from(path),
            id: path.replacen("/app", ".", 1),
            module_type: Module::detect_type(Path::new(path)),
            source,
            resolved: resolved
                .iter()
                .map(|(s, id)| (s.to_string(), id.to_string()))
                .collect(),
            transformed: None,
        }
    }

    #[test]
    fn test_transform_json() {
        let json = r#"{"key": "value", "num": 42}"#;
        let output = transformer(false)
            .transform(&module("/app/data.json", ModuleSource::Text(json.into()), &[]))
            .unwrap();

        assert_eq!(output.code, format!("module.exports = {};", json));
        assert!(output.emitted.is_none());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let err = transformer(false)
            .transform(&module("/app/data.json", ModuleSource::Text("{nope".into()), &[]))
            .unwrap_err();

        assert!(matches!(err, BundleError::InvalidJson { .. }));
    }

    #[test]
    fn test_javascript_specifiers_point_at_module_ids() {
        let source = r#"import("./index.js").catch(e => console.error(e));
const data = require('./data');
const ext = require("left-pad");"#;
        let output = transformer(true)
            .transform(&module(
                "/app/bootstrap.js",
                ModuleSource::Text(source.into()),
                &[("./index.js", "./index.js"), ("./data", "./data.json")],
            ))
            .unwrap();

        assert!(output
            .code
            .starts_with("__wasm_bundle_import__(\"./index.js\").catch"));
        assert!(output.code.contains("const data = require(\"./data.json\");"));
        assert!(output.code.contains("require(\"left-pad\")"));
    }

    #[test]
    fn test_static_imports_become_requires() {
        let source = r#"import * as wasm from "./pkg/app_bg.wasm";
import greet, { add as sum, sub } from './math';
import "./polyfill";
import React from "react";"#;

        let output = transformer(true)
            .transform(&module(
                "/app/index.js",
                ModuleSource::Text(source.into()),
                &[
                    ("./pkg/app_bg.wasm", "./pkg/app_bg.wasm"),
                    ("./math", "./math.js"),
                    ("./polyfill", "./polyfill.js"),
                ],
            ))
            .unwrap();

        let lines: Vec<&str> = output.code.lines().collect();
        assert_eq!(
            lines,
            [
                "var wasm = require(\"./pkg/app_bg.wasm\");",
                "var greet = require(\"./math.js\"); greet = greet && greet.__esModule ? greet.default : greet; var { add: sum, sub } = require(\"./math.js\");",
                "require(\"./polyfill.js\");",
                "var React = require(\"react\"); React = React && React.__esModule ? React.default : React;",
            ]
        );
    }

    #[test]
    fn test_exports_are_assigned_after_the_body() {
        let source = r#"export const answer = 42;
export function greet(name) { return "hi " + name; }
const hidden = 1;
export { hidden as visible };
export { helper } from './helpers';
export default greet;"#;

        let output = transformer(true)
            .transform(&module(
                "/app/math.js",
                ModuleSource::Text(source.into()),
                &[("./helpers", "./helpers.js")],
            ))
            .unwrap();

        let code = output.code;
        assert!(code.starts_with("Object.defineProperty(exports, \"__esModule\", { value: true });\n"));
        assert!(code.contains("const answer = 42;"));
        assert!(code.contains("function greet(name)"));
        assert!(code.contains("exports.default = greet;"));
        assert!(!code.contains("export "));
        assert!(code.ends_with(
            "\nexports.visible = hidden;\nexports.helper = require(\"./helpers.js\").helper;\nexports.answer = answer;\nexports.greet = greet;"
        ));
    }

    #[test]
    fn test_export_star_is_lowered() {
        let source = "export * from \"./app_bg.js\";\nexport * as util from './util';";

        let output = transformer(true)
            .transform(&module(
                "/app/pkg/app.js",
                ModuleSource::Text(source.into()),
                &[("./app_bg.js", "./pkg/app_bg.js"), ("./util", "./pkg/util.js")],
            ))
            .unwrap();

        let code = output.code;
        assert!(code.starts_with("Object.defineProperty(exports, \"__esModule\", { value: true });\n"));
        assert!(code.contains("if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, k)) exports[k] = m[k];"));
        assert!(code.contains("})(require(\"./pkg/app_bg.js\"));"));
        assert!(code.contains("exports.util = require(\"./pkg/util.js\");"));
        assert!(!code.contains("export *"));
    }

    #[test]
    fn test_destructured_exports_are_lowered() {
        let source = "export const { width, height: h, ...rest } = size;\nexport let [first, , last] = list;";

        let output = transformer(true)
            .transform(&module("/app/dims.js", ModuleSource::Text(source.into()), &[]))
            .unwrap();

        let code = output.code;
        assert!(code.contains("const { width, height: h, ...rest } = size;"));
        assert!(code.contains("let [first, , last] = list;"));
        assert!(code.ends_with(
            "\nexports.width = width;\nexports.h = h;\nexports.rest = rest;\nexports.first = first;\nexports.last = last;"
        ));
    }

    #[test]
    fn test_unlowerable_module_syntax_is_an_error() {
        let source = "export const { a: { b } } = nested;";

        let err = transformer(true)
            .transform(&module("/app/nested.js", ModuleSource::Text(source.into()), &[]))
            .unwrap_err();

        assert!(matches!(
            err,
            BundleError::UnsupportedSyntax { statement, .. } if statement == source
        ));
    }

    #[test]
    fn test_commented_module_syntax_is_dropped() {
        let source = "// export const stale = 1;\n/* import x from './x'; */\nconsole.log(\"// kept\");";

        let output = transformer(true)
            .transform(&module("/app/index.js", ModuleSource::Text(source.into()), &[]))
            .unwrap();

        assert!(!output.code.contains("exports.stale"));
        assert!(!output.code.contains("require("));
        assert!(output.code.contains("console.log(\"// kept\");"));
    }

    #[test]
    fn test_wasm_is_emitted_when_enabled() {
        let bytes = b"\0asm\x01\x00\x00\x00".to_vec();
        let output = transformer(true)
            .transform(&module(
                "/app/pkg/app_bg.wasm",
                ModuleSource::Binary(bytes.clone()),
                &[("./app_bg.js", "./pkg/app_bg.js")],
            ))
            .unwrap();

        let emitted = output.emitted.unwrap();
        assert_eq!(emitted.file_name, format!("{}.module.wasm", hash_content(&bytes)));
        assert_eq!(emitted.content, bytes);
        assert_eq!(
            output.code,
            format!(
                "{{\"file\":\"{}\",\"imports\":{{\"./app_bg.js\":\"./pkg/app_bg.js\"}}}}",
                emitted.file_name
            )
        );
    }

    #[test]
    fn test_wasm_requires_experiment() {
        let err = transformer(false)
            .transform(&module("/app/pkg/app_bg.wasm", ModuleSource::Binary(b"\0asm".to_vec()), &[]))
            .unwrap_err();

        assert!(matches!(err, BundleError::WasmExperimentDisabled(_)));
    }

    #[test]
    fn test_wasm_magic_is_checked() {
        let err = transformer(true)
            .transform(&module("/app/fake.wasm", ModuleSource::Binary(b"MZ\x90\x00".to_vec()), &[]))
            .unwrap_err();

        assert!(matches!(err, BundleError::InvalidWasm { .. }));
    }

    #[test]
    fn test_unknown_modules_are_rejected() {
        let err = transformer(true)
            .transform(&module("/app/style.css", ModuleSource::Text("body {}".into()), &[]))
            .unwrap_err();

        assert!(matches!(err, BundleError::UnsupportedModule(_)));
    }
}
