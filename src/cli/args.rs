//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::net::IpAddr;
use std::path::PathBuf;

/// Sitegen static site authoring CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (contains config.toml)
    #[arg(short = 'r', long, global = true, default_value = ".", value_hint = clap::ValueHint::DirPath)]
    pub project_root: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the development loop: preview server, file watcher, live reload
    #[command(visible_alias = "d")]
    Dev {
        /// Network interface to bind (e.g., 127.0.0.1, 0.0.0.0)
        #[arg(short, long)]
        interface: Option<IpAddr>,

        /// Port number to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render all routes into the output directory for production
    #[command(visible_alias = "b")]
    Build,

    /// Run the render server process (spawned internally by `dev`)
    #[command(hide = true)]
    RenderServer {
        /// Route table snapshot file
        #[arg(long)]
        routes: PathBuf,

        /// Interface to bind
        #[arg(long)]
        interface: IpAddr,

        /// Port to bind
        #[arg(long)]
        port: u16,

        /// Live-reload WebSocket port for the autorefresh script
        #[arg(long)]
        ws_port: Option<u16>,
    },
}
