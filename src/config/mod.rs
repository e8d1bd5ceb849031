//! Project configuration loaded from `config.toml`.
//!
//! # Sections
//!
//! ```toml
//! [general]
//! template_dir = "templates"   # Jinja template tree
//! static_dir = "static"        # copied verbatim, served under /static
//! output_dir = "output"        # production build target
//! content = "content.toml"     # single file or directory of TOML records
//!
//! [serve]
//! interface = "127.0.0.1"      # network interface to bind
//! port = 8000                  # preview HTTP port
//! ws_port = 35729              # live-reload WebSocket port
//! watch = true                 # rebuild + reload on file changes
//! ```
//!
//! The configuration is an immutable value: it is loaded once at startup
//! and passed into each component by reference, never mutated globally.

use serde::Deserialize;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name looked up in the project root.
pub const CONFIG_FILE: &str = "config.toml";

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file")]
    Toml(#[from] toml::de::Error),
}

/// Root configuration structure representing `config.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Project root directory - parent of the config file (internal).
    #[serde(skip)]
    root: PathBuf,

    /// Project layout settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Development server settings.
    #[serde(default)]
    pub serve: ServeConfig,
}

/// `[general]` project layout.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Content source: a single `.toml` file or a directory of them.
    pub content: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
            output_dir: PathBuf::from("output"),
            content: PathBuf::from("content.toml"),
        }
    }
}

/// `[serve]` development server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// Preview HTTP port.
    pub port: u16,

    /// Live-reload WebSocket port.
    pub ws_port: u16,

    /// Enable the file watcher for live reload.
    pub watch: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 8000,
            ws_port: 35729,
            watch: true,
        }
    }
}

impl Config {
    /// Load `config.toml` from the project root.
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(CONFIG_FILE);
        let text = fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
        let mut config: Self = toml::from_str(&text)?;
        config.root = project_root.to_path_buf();
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.join(&self.general.template_dir)
    }

    pub fn static_dir(&self) -> PathBuf {
        self.root.join(&self.general.static_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.general.output_dir)
    }

    pub fn content_path(&self) -> PathBuf {
        self.root.join(&self.general.content)
    }

    /// Address the preview server binds to.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.serve.interface, self.serve.port)
    }

    /// Address a local client (or the readiness probe) can reach the
    /// preview server on; an unspecified interface maps to loopback.
    pub fn probe_addr(&self) -> SocketAddr {
        let ip = if self.serve.interface.is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.serve.interface
        };
        SocketAddr::new(ip, self.serve.port)
    }
}
