//! Path normalization and URL-to-filesystem resolution.

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to joining with the current directory for relative paths.
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        }
    })
}

/// Normalize a request URL: percent-decode, strip the query string,
/// collapse trailing slashes (keeping the root `/`).
pub fn normalize_url(url: &str) -> String {
    use percent_encoding::percent_decode_str;

    let decoded = percent_decode_str(url)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();
    let path = decoded.split('?').next().unwrap_or(&decoded);

    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolve a URL suffix to a file under `serve_root`.
///
/// Rejects traversal out of the root (including via symlinks) by
/// canonicalizing both sides before the containment check.
pub fn resolve_static(url_rest: &str, serve_root: &Path) -> Option<PathBuf> {
    let clean = url_rest.trim_matches('/');
    if clean.contains("..") {
        return None;
    }

    let local = serve_root.join(clean);
    let canonical = local.canonicalize().ok()?;
    let root_canonical = serve_root.canonicalize().ok()?;

    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    canonical.is_file().then_some(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("/"), "/");
        assert_eq!(normalize_url("/blog/"), "/blog");
        assert_eq!(normalize_url("/blog?page=2"), "/blog");
        assert_eq!(normalize_url("/a%20b"), "/a b");
    }

    #[test]
    fn test_resolve_static_hit() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("css/site.css"), "body{}").unwrap();

        let found = resolve_static("css/site.css", temp.path()).unwrap();
        assert!(found.ends_with("css/site.css"));
    }

    #[test]
    fn test_resolve_static_rejects_traversal() {
        let temp = TempDir::new().unwrap();
        assert!(resolve_static("../etc/passwd", temp.path()).is_none());
    }

    #[test]
    fn test_resolve_static_misses_directory() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        assert!(resolve_static("css", temp.path()).is_none());
    }
}
