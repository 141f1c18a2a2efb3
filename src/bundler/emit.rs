//! Bundle rendering: module runtime, module wrappers and minification

use std::iter::Peekable;
use std::str::Chars;

use super::{Module, ModuleGraph, ModuleId, ModuleType};
use crate::config::Mode;
use crate::utils::hash_content;

/// Chunk name substituted for `[name]`
pub const CHUNK_NAME: &str = "main";

/// Render the bundle for the modules in `order`; the first one is executed
pub fn render_bundle(graph: &ModuleGraph, order: &[ModuleId], mode: Mode) -> String {
    let async_modules = graph.async_modules();
    let mut bundle_code = String::new();

    bundle_code.push_str(RUNTIME);

    for &module_id in order {
        let Some(module) = graph.get_module(module_id) else {
            continue;
        };

        bundle_code.push_str(&render_module(module, mode));

        if async_modules.contains(&module_id) {
            let waits_for: Vec<String> = graph
                .static_dependencies(module_id)
                .filter(|dep| async_modules.contains(dep))
                .filter_map(|dep| graph.get_module(dep))
                .map(|dep| format!("\"{}\"", dep.id))
                .collect();

            if !waits_for.is_empty() {
                bundle_code.push_str(&format!(
                    "__wasm_bundle_async__[\"{}\"] = [{}];\n",
                    module.id,
                    waits_for.join(", ")
                ));
            }
        }
    }

    if let Some(entry) = order.first().and_then(|&id| graph.get_module(id)) {
        bundle_code.push_str(&format!(
            "\n// Execute entry point\n__wasm_bundle_import__(\"{}\").catch(function (e) {{ console.error(e); }});\n",
            entry.id
        ));
    }

    if mode.is_production() {
        minify_code(&bundle_code)
    } else {
        bundle_code
    }
}

fn render_module(module: &Module, mode: Mode) -> String {
    let code = module.transformed.as_deref().unwrap_or_default();
    let comment = match mode {
        Mode::Development => format!("\n// Module: {}", module.id),
        Mode::Production => String::new(),
    };

    match module.module_type {
        ModuleType::Wasm => format!(
            "{}\n__wasm_bundle_wasm__[\"{}\"] = {};\n",
            comment, module.id, code
        ),
        _ => format!(
            "{}\n__wasm_bundle_modules__[\"{}\"] = function(module, exports, require) {{\n{}\n}};\n",
            comment, module.id, code
        ),
    }
}

/// Substitute `[name]` and `[contenthash]` in the output file name
pub fn output_file_name(template: &str, code: &str) -> String {
    let mut name = template.replace("[name]", CHUNK_NAME);
    if name.contains("[contenthash]") {
        name = name.replace("[contenthash]", &hash_content(code.as_bytes()));
    }
    name
}

/// Module runtime prepended to every bundle.
///
/// WebAssembly modules and every module that statically depends on one are
/// asynchronous: `__wasm_bundle_import__` instantiates the binaries they wait
/// for before their body runs, so a plain `require` of a wasm module inside
/// such a body sees the instance exports.
const RUNTIME: &str = r#"// wasm-bundle runtime
(function() {
  var __wasm_bundle_modules__ = {};
  var __wasm_bundle_wasm__ = {};
  var __wasm_bundle_async__ = {};
  var __wasm_bundle_cache__ = {};
  var __wasm_bundle_loading__ = {};
  var __wasm_bundle_base__ = (typeof document !== "undefined" && document.currentScript && document.currentScript.src) || location.href;

  function __wasm_bundle_require__(moduleId) {
    if (__wasm_bundle_cache__[moduleId]) {
      return __wasm_bundle_cache__[moduleId].exports;
    }

    var module = { exports: {} };
    __wasm_bundle_cache__[moduleId] = module;

    var moduleFn = __wasm_bundle_modules__[moduleId];
    if (moduleFn) {
      moduleFn(module, module.exports, __wasm_bundle_require__);
    }

    return module.exports;
  }

  function __wasm_bundle_import__(moduleId) {
    if (moduleId in __wasm_bundle_loading__) {
      // null while its own dependencies are still being collected
      return __wasm_bundle_loading__[moduleId] || Promise.resolve();
    }
    __wasm_bundle_loading__[moduleId] = null;

    var deps = (__wasm_bundle_async__[moduleId] || []).map(__wasm_bundle_import__);
    var loading = Promise.all(deps).then(function () {
      var wasm = __wasm_bundle_wasm__[moduleId];
      return wasm ? __wasm_bundle_instantiate__(moduleId, wasm) : __wasm_bundle_require__(moduleId);
    });

    __wasm_bundle_loading__[moduleId] = loading;
    return loading;
  }

  function __wasm_bundle_instantiate__(moduleId, wasm) {
    var imports = {};
    Object.keys(wasm.imports).forEach(function (name) {
      imports[name] = __wasm_bundle_require__(wasm.imports[name]);
    });

    var request = fetch(new URL(wasm.file, __wasm_bundle_base__));
    var instantiated = typeof WebAssembly.instantiateStreaming === "function"
      ? WebAssembly.instantiateStreaming(request, imports)
      : request
          .then(function (response) { return response.arrayBuffer(); })
          .then(function (bytes) { return WebAssembly.instantiate(bytes, imports); });

    return instantiated.then(function (result) {
      // Modules in an import cycle may already hold this exports object
      var exports = __wasm_bundle_require__(moduleId);
      Object.assign(exports, result.instance.exports);
      return exports;
    });
  }

  window.__wasm_bundle_modules__ = __wasm_bundle_modules__;
  window.__wasm_bundle_wasm__ = __wasm_bundle_wasm__;
  window.__wasm_bundle_async__ = __wasm_bundle_async__;
  window.__wasm_bundle_require__ = __wasm_bundle_require__;
  window.__wasm_bundle_import__ = __wasm_bundle_import__;
})();
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Keep,
    Collapse,
}

/// Strip comments and collapse whitespace outside of literals
pub fn minify_code(code: &str) -> String {
    scan(code, Layout::Collapse).trim().to_string()
}

/// Strip comments, leaving literals and line structure intact
pub fn strip_comments(code: &str) -> String {
    scan(code, Layout::Keep)
}

fn scan(code: &str, layout: Layout) -> String {
    let mut result = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                result.push(c);
                copy_literal(&mut chars, &mut result, c);
            }
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                let mut lines = 0;
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        break;
                    }
                    if next == '\n' {
                        lines += 1;
                    }
                    prev = next;
                }

                match (layout, lines) {
                    (Layout::Keep, 0) => result.push(' '),
                    (Layout::Keep, _) => result.extend(std::iter::repeat('\n').take(lines)),
                    (Layout::Collapse, 0) => push_whitespace(&mut result, ' ', layout),
                    (Layout::Collapse, _) => push_whitespace(&mut result, '\n', layout),
                }
            }
            '/' if starts_regex(&result) => {
                result.push(c);
                copy_literal(&mut chars, &mut result, c);
            }
            c if c.is_whitespace() => push_whitespace(&mut result, c, layout),
            c => result.push(c),
        }
    }

    result
}

/// Copy a string, template or regex literal up to its closing delimiter
fn copy_literal(chars: &mut Peekable<Chars<'_>>, result: &mut String, delimiter: char) {
    let regex = delimiter == '/';
    let mut escaped = false;
    let mut in_class = false;

    for c in chars.by_ref() {
        result.push(c);

        if escaped {
            escaped = false;
            continue;
        }

        match c {
            '\\' => escaped = true,
            '[' if regex => in_class = true,
            ']' if regex => in_class = false,
            // Unterminated; only template literals span lines
            '\n' if delimiter != '`' => break,
            c if c == delimiter && !in_class => break,
            _ => {}
        }
    }
}

/// Whether a `/` at this point opens a regex literal rather than dividing
fn starts_regex(code: &str) -> bool {
    let code = code.trim_end();
    let Some(last) = code.chars().last() else {
        return true;
    };

    if code.ends_with("++") || code.ends_with("--") {
        return false;
    }
    if "(,=:[!&|?{};+-*%<>~^".contains(last) {
        return true;
    }

    let word = &code[code
        .trim_end_matches(|c: char| c.is_alphanumeric() || c == '_' || c == '$')
        .len()..];

    matches!(
        word,
        "return" | "typeof" | "instanceof" | "in" | "of" | "new" | "delete" | "void"
            | "throw" | "case" | "do" | "else" | "yield" | "await"
    )
}

fn push_whitespace(result: &mut String, c: char, layout: Layout) {
    match layout {
        Layout::Keep => result.push(c),
        // Newlines survive so automatic semicolon insertion still applies
        Layout::Collapse if c == '\n' => {
            if result.ends_with(' ') {
                result.pop();
            }
            if !result.is_empty() && !result.ends_with('\n') {
                result.push('\n');
            }
        }
        Layout::Collapse => {
            if !result.is_empty() && !result.ends_with(' ') && !result.ends_with('\n') {
                result.push(' ');
            }
        }
    }
}
