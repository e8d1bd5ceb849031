//! `dev` command: the live development loop.
//!
//! Wires the pieces together and hands control to the orchestrator:
//! a live-reload WebSocket channel, a recursive project watcher, a
//! Ctrl+C handler, and a supervisor that runs the render server as a
//! child process of this binary (the hidden `render-server` subcommand).

use crate::config::Config;
use crate::logger;
use crate::orchestrator::DevOrchestrator;
use crate::reload::LiveReloadChannel;
use crate::supervisor::{CommandBuilder, Supervisor};
use crate::watch;
use crate::{debug, log};
use anyhow::{Context, Result};
use std::net::IpAddr;
use std::process::Command;
use tokio::sync::mpsc;

/// Run the dev loop until Ctrl+C. Blocks the calling thread.
pub fn run(mut config: Config, interface: Option<IpAddr>, port: Option<u16>) -> Result<()> {
    if let Some(interface) = interface {
        config.serve.interface = interface;
    }
    if let Some(port) = port {
        config.serve.port = port;
    }

    let channel = LiveReloadChannel::start(config.serve.ws_port)
        .context("failed to start live-reload channel")?;
    let ws_port = config.serve.watch.then(|| channel.port());
    if let Some(port) = ws_port {
        debug!("reload"; "ws://localhost:{port}");
    }

    let (event_tx, event_rx) = mpsc::channel(256);
    let mut _event_tx_keepalive = None;
    let _watcher = if config.serve.watch {
        let watcher = watch::spawn(config.root(), event_tx)
            .context("failed to start file watcher")?;
        log!("watch"; "{}", config.root().display());
        Some(watcher)
    } else {
        // Keep the channel open so a closed-channel read still means
        // the watcher died, not that watching is disabled.
        _event_tx_keepalive = Some(event_tx);
        None
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    ctrlc::set_handler(move || {
        if shutdown_tx.try_send(()).is_err() {
            // Second Ctrl+C while the first is still winding down.
            std::process::exit(130);
        }
    })
    .context("failed to install Ctrl+C handler")?;

    let supervisor = Supervisor::new(config.probe_addr(), render_command(&config, ws_port)?);
    let orchestrator = DevOrchestrator::new(config, supervisor, channel, event_rx, shutdown_rx);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(orchestrator.run())
}

/// Build the command template for spawning a render server. Re-invokes
/// this binary with the hidden subcommand; the supervisor fills in the
/// snapshot path at each (re)start.
fn render_command(config: &Config, ws_port: Option<u16>) -> Result<CommandBuilder> {
    let exe = std::env::current_exe().context("failed to locate own executable")?;
    let root = config.root().to_path_buf();
    let interface = config.serve.interface;
    let port = config.serve.port;
    let verbose = logger::is_verbose();

    Ok(Box::new(move |snapshot| {
        let mut command = Command::new(&exe);
        command
            .arg("render-server")
            .arg("--project-root")
            .arg(&root)
            .arg("--routes")
            .arg(snapshot)
            .arg("--interface")
            .arg(interface.to_string())
            .arg("--port")
            .arg(port.to_string());
        if let Some(ws_port) = ws_port {
            command.arg("--ws-port").arg(ws_port.to_string());
        }
        if verbose {
            command.arg("--verbose");
        }
        command
    }))
}
