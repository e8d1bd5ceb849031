//! `build` command: production export.
//!
//! Renders every derived route to a file under the output directory,
//! then copies non-template files from the template tree and the whole
//! static directory alongside. Private (`_`-prefixed) entries never
//! reach the output.

use crate::config::Config;
use crate::content::ContentStore;
use crate::core::BuildMode;
use crate::log;
use crate::render;
use crate::route::{self, RouteDeriver};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::time::Instant;

pub fn run(config: &Config) -> Result<()> {
    let started = Instant::now();

    let content_path = config.content_path();
    let store = if content_path.exists() {
        ContentStore::load(&content_path)?
    } else {
        ContentStore::default()
    };

    let table =
        RouteDeriver::new(&config.template_dir(), &store, BuildMode::Production).derive()?;

    let output_dir = config.output_dir();
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let rendered = render::export(config, &table)?;
    let passthrough = copy_passthrough(&config.template_dir(), &output_dir)?;
    let statics = copy_tree(&config.static_dir(), &output_dir.join("static"))?;

    log!(
        "build";
        "{rendered} pages, {} copied files in {:.2?} -> {}",
        passthrough + statics,
        started.elapsed(),
        output_dir.display()
    );
    Ok(())
}

/// Copy files from the template tree that are not templates and not
/// private, preserving their relative paths.
fn copy_passthrough(template_dir: &Path, output_dir: &Path) -> Result<usize> {
    let mut copied = 0;
    let mut work = vec![template_dir.to_path_buf()];

    while let Some(dir) = work.pop() {
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let path = entry?.path();
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if name.starts_with(route::PRIVATE_MARKER) || name.starts_with('.') {
                continue;
            }
            if path.is_dir() {
                work.push(path);
                continue;
            }
            if route::is_template_name(name) {
                continue;
            }

            let rel = path.strip_prefix(template_dir).unwrap_or(&path);
            copy_file(&path, &output_dir.join(rel))?;
            copied += 1;
        }
    }
    Ok(copied)
}

/// Recursively copy a directory. Missing sources are fine (a project
/// without a static directory is valid).
fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Ok(0);
    }

    let mut copied = 0;
    let mut work = vec![source.to_path_buf()];

    while let Some(dir) = work.pop() {
        for entry in fs::read_dir(&dir)
            .with_context(|| format!("Failed to read {}", dir.display()))?
        {
            let path = entry?.path();
            if path.is_dir() {
                work.push(path);
            } else {
                let rel = path.strip_prefix(source).unwrap_or(&path);
                copy_file(&path, &target.join(rel))?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::copy(source, target)
        .with_context(|| format!("Failed to copy {}", source.display()))?;
    Ok(())
}
