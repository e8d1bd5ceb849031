//! Content key derivation from filesystem paths.
//!
//! A content file's location decides where its records live in the key
//! space: `blog/posts/hello.toml` loads under `blog.posts.hello`. Every
//! dot-suffix of the file name is removed, matching the URL scheme where
//! extensions never appear.

use std::path::Path;

/// Reserved key for the site root (`/`).
pub const INDEX_KEY: &str = "index";

/// Derive the dotted content key for a file relative to the content root.
///
/// - Path separators become dots.
/// - Every extension of the file name is stripped (`hello.toml` and
///   `hello.tar.toml` both derive `hello`).
/// - The empty relative path derives the reserved key `index`.
pub fn derive_key(relative: &Path) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for component in relative.components() {
        if let std::path::Component::Normal(seg) = component
            && let Some(seg) = seg.to_str()
        {
            parts.push(seg);
        }
    }

    let Some(file_name) = parts.pop() else {
        return INDEX_KEY.to_string();
    };

    let stem = strip_all_extensions(file_name);
    if !stem.is_empty() {
        parts.push(stem);
    }

    if parts.is_empty() {
        INDEX_KEY.to_string()
    } else {
        parts.join(".")
    }
}

/// Convert a URL path into a dotted content key.
///
/// `/` maps to `index`; otherwise leading/trailing slashes are stripped
/// and separators replaced with dots. A trailing `.index` segment is
/// removed so `/blog/index` and `/blog` resolve identically.
pub fn url_to_key(url_path: &str) -> String {
    let trimmed = url_path.trim_matches('/');
    if trimmed.is_empty() {
        return INDEX_KEY.to_string();
    }

    let key = trimmed.replace('/', ".");
    match key.strip_suffix(".index") {
        Some(prefix) if !prefix.is_empty() => prefix.to_string(),
        _ => key,
    }
}

/// Strip every dot-suffix from a file name (`post.html.toml` -> `post`).
fn strip_all_extensions(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
