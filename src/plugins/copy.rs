//! Copy plugin: places static assets into the output directory untouched

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use globset::{GlobBuilder, GlobMatcher};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{AssetInfo, Plugin, PluginContext};
use crate::error::{ConfigError, CopyError, Result};
use crate::utils::normalize_path;

/// A parsed copy pattern.
///
/// The pattern is split into a literal base directory and a glob for the
/// remainder. Matched files land in the output directory at their path
/// relative to that base, so `static/**/*.png` copies `static/img/a.png`
/// to `img/a.png`. A pattern without glob syntax names a single file
/// (copied by file name) or a directory (copied with its contents).
#[derive(Debug, Clone)]
pub struct CopyPattern {
    source: String,
    base: PathBuf,
    matcher: Option<GlobMatcher>,
}

impl CopyPattern {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let invalid = |message: String| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            message,
        };

        let segments: Vec<&str> = pattern
            .trim()
            .split(['/', '\\'])
            .filter(|s| !s.is_empty() && *s != ".")
            .collect();

        if segments.is_empty() {
            return Err(invalid("pattern is empty".to_string()));
        }

        let glob_start = segments
            .iter()
            .position(|s| s.contains(['*', '?', '[', '{']));

        let (base, matcher): (PathBuf, Option<GlobMatcher>) = match glob_start {
            Some(idx) => {
                let glob = segments[idx..].join("/");
                let matcher = GlobBuilder::new(&glob)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| invalid(e.to_string()))?
                    .compile_matcher();
                (segments[..idx].iter().collect(), Some(matcher))
            }
            None => (segments.iter().collect(), None),
        };

        // Absolute patterns keep their root
        let base = if pattern.trim_start().starts_with('/') {
            Path::new("/").join(base)
        } else {
            base
        };

        Ok(Self {
            source: pattern.to_string(),
            base,
            matcher,
        })
    }

    /// Find matching files under `root`, skipping `output_dir`.
    ///
    /// Returns `(source, destination relative to the output directory)`
    /// pairs in file-name order.
    pub fn matches(&self, root: &Path, output_dir: &Path) -> Result<Vec<(PathBuf, PathBuf)>, CopyError> {
        let base = normalize_path(&root.join(&self.base));

        // An output directory that is the root itself, or outside it, hides nothing
        let output_dir = (output_dir != root && output_dir.starts_with(root)).then_some(output_dir);

        let found = match &self.matcher {
            None if base.is_file() => {
                let name = base.file_name().map(PathBuf::from).unwrap_or_default();
                vec![(base.clone(), name)]
            }
            None if base.is_dir() => walk_files(&base, output_dir, |_| true)?,
            Some(matcher) if base.is_dir() => {
                walk_files(&base, output_dir, |rel| matcher.is_match(rel))?
            }
            _ => Vec::new(),
        };

        if found.is_empty() {
            return Err(CopyError::NoMatches(self.source.clone()));
        }

        Ok(found)
    }
}

fn walk_files<F>(base: &Path, output_dir: Option<&Path>, accept: F) -> Result<Vec<(PathBuf, PathBuf)>, CopyError>
where
    F: Fn(&Path) -> bool,
{
    let mut files = Vec::new();

    let walker = WalkDir::new(base)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !output_dir.is_some_and(|out| e.path().starts_with(out)));

    for entry in walker {
        let entry = entry.map_err(|e| CopyError::Read {
            path: e.path().map(Path::to_path_buf).unwrap_or_else(|| base.to_path_buf()),
            source: e.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(base) else {
            continue;
        };

        if accept(relative) {
            files.push((entry.path().to_path_buf(), relative.to_path_buf()));
        }
    }

    Ok(files)
}

/// Copies every file matched by its patterns, in pattern order.
/// A later pattern overwrites what an earlier one placed.
pub struct CopyPlugin {
    patterns: Vec<CopyPattern>,
}

impl CopyPlugin {
    pub fn new(patterns: &[String]) -> Result<Self, ConfigError> {
        let patterns = patterns
            .iter()
            .map(|p| CopyPattern::parse(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { patterns })
    }

    /// Copy all matched files into `ctx.output_dir`
    pub fn copy_all(&self, ctx: &PluginContext) -> Result<Vec<AssetInfo>, CopyError> {
        let mut assets: Vec<AssetInfo> = Vec::new();

        for pattern in &self.patterns {
            for (source, relative) in pattern.matches(&ctx.root, &ctx.output_dir)? {
                let dest = ctx.output_dir.join(&relative);

                let content = fs::read(&source).map_err(|e| CopyError::Read {
                    path: source.clone(),
                    source: e,
                })?;

                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| CopyError::Write {
                        path: parent.to_path_buf(),
                        source: e,
                    })?;
                }

                fs::write(&dest, &content).map_err(|e| CopyError::Write {
                    path: dest.clone(),
                    source: e,
                })?;

                debug!("Copied {} -> {}", source.display(), dest.display());

                assets.retain(|a| a.output_path != dest);
                assets.push(AssetInfo {
                    output_path: dest,
                    size: content.len(),
                });
            }
        }

        Ok(assets)
    }
}

#[async_trait]
impl Plugin for CopyPlugin {
    fn name(&self) -> &str {
        "copy"
    }

    async fn build_end(&self, ctx: &PluginContext) -> Result<Vec<AssetInfo>> {
        let assets = self.copy_all(ctx)?;
        info!("Copied {} asset(s)", assets.len());
        Ok(assets)
    }
}
