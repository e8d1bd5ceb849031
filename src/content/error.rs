//! Content loading error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the content tree.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Two source files derived the same dotted key. Fatal to the load.
    #[error("duplicate content key `{key}` derived from `{}`", .path.display())]
    DuplicateKey { key: String, path: PathBuf },

    #[error("unsupported content source `{}` (expected a .toml file or a directory)", .0.display())]
    UnsupportedSource(PathBuf),

    #[error("failed to read `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse `{}`", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
