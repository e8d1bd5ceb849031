//! Hierarchical content store.
//!
//! Loads a single TOML file or a directory tree of TOML files into one
//! nested record tree addressed by dotted keys, and resolves URL paths
//! into template contexts. The reserved top-level key `__globals__` is
//! merged into every resolved context.
//!
//! The tree is an immutable snapshot: it is built once per load and
//! rebuilt wholesale on the next restart cycle.

mod error;
mod key;

pub use error::ContentError;
pub use key::{INDEX_KEY, derive_key, url_to_key};

use crate::debug;
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// Reserved key whose record is merged into every resolved context.
pub const GLOBALS_KEY: &str = "__globals__";

/// One loaded content tree.
#[derive(Debug, Default, Clone)]
pub struct ContentStore {
    tree: Map<String, Value>,
}

impl ContentStore {
    /// Load content from a single `.toml` file or a directory of them.
    ///
    /// Directory loads derive each file's dotted key from its relative
    /// path; two files deriving the same key abort the load with
    /// [`ContentError::DuplicateKey`].
    pub fn load(source: &Path) -> Result<Self, ContentError> {
        if source.is_file() {
            if source.extension().and_then(|e| e.to_str()) != Some("toml") {
                return Err(ContentError::UnsupportedSource(source.to_path_buf()));
            }
            let tree = parse_file(source)?;
            return Ok(Self { tree });
        }

        if source.is_dir() {
            return Self::load_dir(source);
        }

        Err(ContentError::UnsupportedSource(source.to_path_buf()))
    }

    /// Walk a directory with an explicit work-list (no recursion, so the
    /// traversal is independent of directory depth). Entries are visited
    /// in sorted order to make duplicate reporting deterministic.
    fn load_dir(root: &Path) -> Result<Self, ContentError> {
        let mut store = Self::default();
        let mut work = vec![root.to_path_buf()];

        while let Some(path) = work.pop() {
            if path.is_dir() {
                let mut entries: Vec<_> = fs::read_dir(&path)
                    .map_err(|e| ContentError::Io(path.clone(), e))?
                    .filter_map(|entry| entry.ok().map(|e| e.path()))
                    .collect();
                entries.sort();
                // Stack order: reversed so entries are processed in sorted order.
                work.extend(entries.into_iter().rev());
                continue;
            }

            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with('.') || !name.ends_with(".toml") {
                continue;
            }

            let record = parse_file(&path)?;
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let content_key = derive_key(relative);
            debug!("content"; "loaded `{}` -> {}", relative.display(), content_key);
            store.insert(&content_key, record, &path)?;
        }

        Ok(store)
    }

    /// Insert a record at a dotted key, creating intermediate maps.
    ///
    /// Fails if the exact key slot is already occupied, including when a
    /// previously loaded file created it as an intermediate node.
    fn insert(
        &mut self,
        content_key: &str,
        record: Map<String, Value>,
        source: &Path,
    ) -> Result<(), ContentError> {
        let parts: Vec<&str> = content_key.split('.').collect();
        let (last, prefix) = parts.split_last().expect("split produces at least one part");

        let mut node = &mut self.tree;
        for part in prefix {
            let entry = node
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(map) => node = map,
                _ => {
                    return Err(ContentError::DuplicateKey {
                        key: content_key.to_string(),
                        path: source.to_path_buf(),
                    });
                }
            }
        }

        if node.contains_key(*last) {
            return Err(ContentError::DuplicateKey {
                key: content_key.to_string(),
                path: source.to_path_buf(),
            });
        }
        node.insert(last.to_string(), Value::Object(record));
        Ok(())
    }

    /// Resolve a URL path into a template context.
    ///
    /// Total: a missing branch yields an empty record rather than an
    /// error. The `__globals__` record is always injected, overwriting
    /// any same-named field of the resolved branch.
    pub fn resolve(&self, url_path: &str) -> Map<String, Value> {
        let content_key = url_to_key(url_path);
        let mut record = self
            .lookup(&content_key)
            .cloned()
            .unwrap_or_default();
        record.insert(GLOBALS_KEY.to_string(), Value::Object(self.globals()));
        record
    }

    /// Look up the record map at a dotted key. Scalars and missing
    /// branches both resolve to `None`.
    fn lookup(&self, content_key: &str) -> Option<&Map<String, Value>> {
        let mut node = &self.tree;
        let mut parts = content_key.split('.').peekable();

        while let Some(part) = parts.next() {
            match node.get(part) {
                Some(Value::Object(map)) => node = map,
                _ => return None,
            }
            if parts.peek().is_none() {
                return Some(node);
            }
        }
        Some(node)
    }

    /// The top-level `__globals__` record (empty if absent).
    fn globals(&self) -> Map<String, Value> {
        match self.tree.get(GLOBALS_KEY) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }
}

/// Parse one TOML file into an ordered JSON-like record.
fn parse_file(path: &Path) -> Result<Map<String, Value>, ContentError> {
    let text = fs::read_to_string(path).map_err(|e| ContentError::Io(path.to_path_buf(), e))?;
    let table: toml::Table = toml::from_str(&text).map_err(|source| ContentError::Toml {
        path: path.to_path_buf(),
        source,
    })?;

    let mut record = Map::new();
    for (field, value) in table {
        record.insert(field, toml_to_json(value));
    }
    Ok(record)
}

/// Convert a TOML value into a JSON value, datetimes as strings.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(field, value)| (field, toml_to_json(value)))
                .collect(),
        ),
    }
}
