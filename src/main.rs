//! Sitegen - a template-first static site authoring tool.

#![allow(dead_code)]

mod cli;
mod config;
mod content;
mod core;
mod logger;
mod orchestrator;
mod reload;
mod render;
mod route;
mod supervisor;
mod utils;
mod watch;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::Config;
use std::net::SocketAddr;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let root = utils::path::normalize_path(&cli.project_root);
    let config = Config::load(&root)?;

    match cli.command {
        Commands::Dev { interface, port } => cli::dev::run(config, interface, port),
        Commands::Build => cli::build::run(&config),
        Commands::RenderServer {
            routes,
            interface,
            port,
            ws_port,
        } => render::serve(
            &config,
            &render::ServeOpts {
                routes,
                addr: SocketAddr::new(interface, port),
                ws_port,
            },
        ),
    }
}
