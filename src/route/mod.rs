//! Route derivation: template directory tree -> URL routing table.
//!
//! Template files follow a double-suffix convention, `name.<kind>.jinja`
//! (e.g. `index.html.jinja`). A leading underscore marks a partial and
//! never produces a route. URL mapping:
//!
//! - `index.*` in directory `D` maps to `D`'s own URL (root -> `/`)
//! - any other `name.*` in `D` maps to `D/name`
//!
//! Each route's context is resolved from the [`ContentStore`] and tagged
//! with `SITEGEN_ENV` for the active build mode. Two templates deriving
//! the same URL abort derivation: collisions fail fast rather than
//! silently overwriting.

use crate::content::ContentStore;
use crate::core::BuildMode;
use crate::debug;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File-name prefix that excludes a template (or directory) from routing.
pub const PRIVATE_MARKER: char = '_';

/// Suffix selecting the template renderer.
pub const TEMPLATE_SUFFIX: &str = ".jinja";

/// Context field carrying the active build mode.
pub const ENV_KEY: &str = "SITEGEN_ENV";

/// Route derivation errors.
#[derive(Debug, Error)]
pub enum RouteError {
    /// Two template files derived the same URL path.
    #[error("route collision on `{url_path}`: `{template}` and `{existing}`")]
    Collision {
        url_path: String,
        template: String,
        existing: String,
    },

    #[error("failed to read template directory `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
}

/// One derived (URL, template, context) triple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    /// Unique URL path, always starting with `/`.
    pub url_path: String,
    /// Template path relative to the template root, `/`-separated.
    pub template: String,
    /// Resolved context including `__globals__` and `SITEGEN_ENV`.
    pub context: Map<String, Value>,
}

/// Immutable snapshot of all derived routes.
///
/// Serializable so the supervisor can hand it to the render-server
/// process as a JSON snapshot file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn into_routes(self) -> Vec<Route> {
        self.routes
    }

    /// Find a route by exact URL path.
    pub fn get(&self, url_path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.url_path == url_path)
    }

    /// Read a snapshot previously written by the supervisor.
    pub fn from_snapshot(path: &Path) -> anyhow::Result<Self> {
        let file = fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}

/// Derives a [`RouteTable`] from a template directory and a content store.
pub struct RouteDeriver<'a> {
    template_dir: &'a Path,
    store: &'a ContentStore,
    mode: BuildMode,
}

impl<'a> RouteDeriver<'a> {
    pub fn new(template_dir: &'a Path, store: &'a ContentStore, mode: BuildMode) -> Self {
        Self {
            template_dir,
            store,
            mode,
        }
    }

    /// Walk the template tree and derive all routes.
    ///
    /// The walk uses an explicit work-list of (directory, URL prefix)
    /// pairs; entries are visited in sorted order so collision reports
    /// are deterministic.
    pub fn derive(&self) -> Result<RouteTable, RouteError> {
        let mut routes: Vec<Route> = Vec::new();
        let mut by_url: FxHashMap<String, usize> = FxHashMap::default();
        let mut work = vec![(self.template_dir.to_path_buf(), String::new())];

        while let Some((dir, prefix)) = work.pop() {
            let mut entries: Vec<_> = fs::read_dir(&dir)
                .map_err(|e| RouteError::Io(dir.clone(), e))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .collect();
            entries.sort();

            for path in entries.into_iter().rev() {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if name.starts_with(PRIVATE_MARKER) || name.starts_with('.') {
                    continue;
                }

                if path.is_dir() {
                    let child_prefix = format!("{prefix}/{name}");
                    work.push((path, child_prefix));
                    continue;
                }

                if !is_template_name(name) {
                    continue;
                }

                let url_path = derive_url(&prefix, name);
                let template = path
                    .strip_prefix(self.template_dir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .replace('\\', "/");

                if let Some(&index) = by_url.get(&url_path) {
                    return Err(RouteError::Collision {
                        url_path,
                        template,
                        existing: routes[index].template.clone(),
                    });
                }

                let mut context = self.store.resolve(&url_path);
                context.insert(
                    ENV_KEY.to_string(),
                    Value::String(self.mode.env_str().to_string()),
                );

                debug!("route"; "GET {} -> {}", url_path, template);
                by_url.insert(url_path.clone(), routes.len());
                routes.push(Route {
                    url_path,
                    template,
                    context,
                });
            }
        }

        Ok(RouteTable { routes })
    }
}

/// Whether a file name matches the `name.<kind>.jinja` convention.
pub fn is_template_name(name: &str) -> bool {
    name.strip_suffix(TEMPLATE_SUFFIX)
        .is_some_and(|stem| stem.contains('.') && !stem.starts_with('.'))
}

/// Map a template file name within a URL prefix onto its URL path.
fn derive_url(prefix: &str, name: &str) -> String {
    let first = name.split('.').next().unwrap_or(name);
    if first == "index" {
        if prefix.is_empty() {
            "/".to_string()
        } else {
            prefix.to_string()
        }
    } else {
        format!("{prefix}/{first}")
    }
}
