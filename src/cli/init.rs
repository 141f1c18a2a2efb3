//! Project initialization command

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::CONFIG_FILE;

/// Initialize a new project
#[derive(Args, Debug)]
pub struct InitCommand {
    /// Project directory
    #[arg(default_value = ".")]
    pub name: String,

    /// wasm-bindgen output directory imported by index.js
    #[arg(long, default_value = "pkg")]
    pub pkg_dir: String,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub async fn execute(&self) -> Result<()> {
        let project_dir = Path::new(&self.name);

        eprintln!("{} Initializing new project...\n", "→".blue());

        if self.name != "." {
            fs::create_dir_all(project_dir).context("Failed to create project directory")?;
        }

        let config_path = project_dir.join(CONFIG_FILE);
        if config_path.exists() && !self.force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                config_path.display()
            );
        }

        self.write(project_dir, CONFIG_FILE, &self.generate_config())?;
        self.write(project_dir, "bootstrap.js", BOOTSTRAP_JS)?;
        self.write(project_dir, "index.js", &self.generate_index_js())?;
        self.write(project_dir, "index.html", INDEX_HTML)?;

        eprintln!("\n{} Project initialized successfully!\n", "✓".green().bold());

        eprintln!("  Next steps:");
        if self.name != "." {
            eprintln!("    {} cd {}", "→".dimmed(), self.name.cyan());
        }
        eprintln!("    {} wasm-pack build --target bundler", "→".dimmed());
        eprintln!("    {} wasm-bundle watch", "→".dimmed());
        eprintln!();

        Ok(())
    }

    fn write(&self, project_dir: &Path, name: &str, content: &str) -> Result<()> {
        fs::write(project_dir.join(name), content)
            .with_context(|| format!("Failed to write {}", name))?;
        eprintln!("  {} Created {}", "✓".green(), name.cyan());
        Ok(())
    }

    fn generate_config(&self) -> String {
        r#"# wasm-bundle configuration

entry = "./bootstrap.js"
mode = "development"

[output]
path = "dist"
filename = "bootstrap.js"

[[plugins]]
name = "copy"
options = { patterns = ["index.html"] }

[experiments]
async_web_assembly = true

[watch_options]
aggregate_timeout = 200
poll = 200
"#
        .to_string()
    }

    fn generate_index_js(&self) -> String {
        format!(
            r#"import * as wasm from "./{}/index_bg.wasm";

wasm.then((exports) => console.log("wasm exports", Object.keys(exports)));
"#,
            self.pkg_dir.trim_end_matches('/')
        )
    }
}

const BOOTSTRAP_JS: &str = r#"// A dependency graph that contains any wasm must be loaded asynchronously.
import("./index.js")
  .catch(e => console.error("Error importing `index.js`:", e));
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>Hello wasm</title>
  </head>
  <body>
    <noscript>This page contains webassembly and javascript content, please enable javascript in your browser.</noscript>
    <script src="./bootstrap.js"></script>
  </body>
</html>
"#;
