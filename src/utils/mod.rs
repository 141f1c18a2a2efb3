//! Utility functions and helpers

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

/// Generate a hash of the given content
pub fn hash_content(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    hex::encode(&result[..8])
}

/// Lexically remove `.` and `..` components without touching the file system
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => match result.components().next_back() {
                Some(Component::Normal(_)) => {
                    result.pop();
                }
                // Never pop past the root
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => result.push(".."),
            },
            other => result.push(other.as_os_str()),
        }
    }

    result
}

/// Stable module identifier: the path relative to the project root, `/`-separated
pub fn module_id(root: &Path, path: &Path) -> String {
    let relative = pathdiff::diff_paths(path, root).unwrap_or_else(|| path.to_path_buf());
    let id = relative.display().to_string().replace('\\', "/");

    if id.starts_with("../") {
        id
    } else {
        format!("./{}", id)
    }
}

/// Format bytes as human-readable size
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format duration as human-readable string
pub fn format_duration(duration: std::time::Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_content() {
        let hash = hash_content(b"hello world");
        assert_eq!(hash.len(), 16);
        assert_eq!(hash, hash_content(b"hello world"));
        assert_ne!(hash, hash_content(b"hello world!"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path(Path::new("./foo/bar")), PathBuf::from("foo/bar"));
        assert_eq!(normalize_path(Path::new("foo/../bar")), PathBuf::from("bar"));
        assert_eq!(
            normalize_path(Path::new("/foo/./bar/../baz")),
            PathBuf::from("/foo/baz")
        );
        assert_eq!(normalize_path(Path::new("/../dist")), PathBuf::from("/dist"));
        assert_eq!(normalize_path(Path::new("../a/./b")), PathBuf::from("../a/b"));
    }

    #[test]
    fn test_module_id() {
        let root = Path::new("/app");
        assert_eq!(module_id(root, Path::new("/app/bootstrap.js")), "./bootstrap.js");
        assert_eq!(module_id(root, Path::new("/app/pkg/lib_bg.wasm")), "./pkg/lib_bg.wasm");
        assert_eq!(module_id(root, Path::new("/shared/a.js")), "../shared/a.js");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        use std::time::Duration;

        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs_f64(1.5)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5.00s");
    }
}
