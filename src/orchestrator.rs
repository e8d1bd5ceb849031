//! Dev-loop orchestrator.
//!
//! Single owner of the dev session: it reacts to filesystem events,
//! debounces them into batches, rebuilds the route table, swaps the
//! render-server process through the supervisor, and only then tells
//! connected browsers to reload. Reload is never broadcast for a
//! restart that did not reach a confirmed-running server, so a browser
//! refresh always lands on the new snapshot.

use crate::config::Config;
use crate::content::ContentStore;
use crate::core::BuildMode;
use crate::reload::LiveReloadChannel;
use crate::route::{RouteDeriver, RouteTable};
use crate::supervisor::Supervisor;
use crate::watch::{Debouncer, FsEvent};
use crate::{debug, log};
use anyhow::Result;
use tokio::sync::mpsc;

/// Orchestrator lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Restarting,
    Terminated,
}

pub struct DevOrchestrator {
    config: Config,
    supervisor: Supervisor,
    channel: LiveReloadChannel,
    events: mpsc::Receiver<FsEvent>,
    shutdown: mpsc::Receiver<()>,
    debouncer: Debouncer,
    phase: Phase,
}

impl DevOrchestrator {
    pub fn new(
        config: Config,
        supervisor: Supervisor,
        channel: LiveReloadChannel,
        events: mpsc::Receiver<FsEvent>,
        shutdown: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            config,
            supervisor,
            channel,
            events,
            shutdown,
            debouncer: Debouncer::new(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run the dev loop until shutdown.
    ///
    /// The initial derivation and server start are fail-fast: a broken
    /// project at startup aborts the session with the error instead of
    /// entering the watch loop.
    pub async fn run(mut self) -> Result<()> {
        let table = self.derive_table()?;
        let route_count = table.len();
        self.supervisor.start(&table)?;
        log!("dev"; "render server ready ({route_count} routes) on http://{}", self.config.http_addr());

        // Watcher death disables the events arm only; the render server
        // keeps serving its last snapshot until Ctrl+C.
        let mut watch_alive = true;

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    log!("dev"; "shutting down");
                    self.terminate();
                    return Ok(());
                }
                event = self.events.recv(), if watch_alive => match event {
                    Some(event) => self.debouncer.add_event(event),
                    None => {
                        log!("error"; "file watcher stopped, live reload disabled");
                        watch_alive = false;
                    }
                },
                _ = tokio::time::sleep(self.debouncer.sleep_duration()) => {
                    if let Some(batch) = self.debouncer.take_if_ready() {
                        self.run_cycle(batch.len());
                    }
                }
            }
        }
    }

    /// One restart cycle for a debounced batch of changes.
    ///
    /// A load/derivation failure leaves the previous render server
    /// serving its stale snapshot. A failed restart leaves no server
    /// (the old child is already stopped) until the next successful
    /// cycle. Only a restart that reached a confirmed-running server
    /// triggers a reload broadcast.
    fn run_cycle(&mut self, change_count: usize) {
        self.phase = Phase::Restarting;
        log!("dev"; "{change_count} change(s) detected, restarting render server");

        match self.derive_table() {
            Ok(table) => match self.supervisor.restart(&table) {
                Ok(()) => {
                    let sent = self.channel.broadcast();
                    log!("reload"; "{} routes, notified {sent} client(s)", table.len());
                }
                Err(e) => {
                    log!("error"; "render server restart failed: {e}");
                    debug!("dev"; "no render server until the next successful cycle");
                }
            },
            Err(e) => {
                log!("error"; "{e:#}");
                debug!("dev"; "derivation failed, previous render server kept");
            }
        }

        self.phase = Phase::Idle;
    }

    fn derive_table(&self) -> Result<RouteTable> {
        let content_path = self.config.content_path();
        let store = if content_path.exists() {
            ContentStore::load(&content_path)?
        } else {
            debug!("dev"; "no content at {}, using empty store", content_path.display());
            ContentStore::default()
        };
        let table =
            RouteDeriver::new(&self.config.template_dir(), &store, BuildMode::Development)
                .derive()?;
        Ok(table)
    }

    fn terminate(&mut self) {
        self.phase = Phase::Terminated;
        if let Err(e) = self.supervisor.stop() {
            log!("error"; "failed to stop render server: {e}");
        }
        self.channel.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reload::RELOAD_TOKEN;
    use crate::watch::FsEventKind;
    use std::fs;
    use std::net::{SocketAddr, TcpListener};
    use std::path::Path;
    use std::process::Command;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tungstenite::stream::MaybeTlsStream;

    fn project(root: &Path) -> Config {
        fs::create_dir_all(root.join("templates")).unwrap();
        fs::write(root.join("templates/index.html.jinja"), "hi").unwrap();
        fs::write(root.join("content.toml"), "[index]\ntitle = \"Hi\"\n").unwrap();
        fs::write(root.join("config.toml"), "").unwrap();
        Config::load(root).unwrap()
    }

    fn sleeper() -> crate::supervisor::CommandBuilder {
        Box::new(|_snapshot| {
            let mut command = Command::new("sleep");
            command.arg("30");
            command
        })
    }

    fn orchestrator(
        config: Config,
        probe_addr: SocketAddr,
    ) -> (DevOrchestrator, mpsc::Sender<FsEvent>, mpsc::Sender<()>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let supervisor = Supervisor::new(probe_addr, sleeper());
        let channel = LiveReloadChannel::start(0).unwrap();
        let orchestrator =
            DevOrchestrator::new(config, supervisor, channel, event_rx, shutdown_rx);
        (orchestrator, event_tx, shutdown_tx)
    }

    #[tokio::test]
    async fn test_run_starts_server_and_stops_on_shutdown() {
        let temp = TempDir::new().unwrap();
        let config = project(temp.path());

        // Stand-in for the render server's bound port.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (orchestrator, _event_tx, shutdown_tx) =
            orchestrator(config, listener.local_addr().unwrap());

        shutdown_tx.send(()).await.unwrap();
        orchestrator.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_run_fails_fast_on_broken_content() {
        let temp = TempDir::new().unwrap();
        let config = project(temp.path());
        fs::write(temp.path().join("content.toml"), "not valid toml [").unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (orchestrator, _event_tx, _shutdown_tx) =
            orchestrator(config, listener.local_addr().unwrap());

        assert!(orchestrator.run().await.is_err());
    }

    #[tokio::test]
    async fn test_watcher_death_keeps_session_alive() {
        let temp = TempDir::new().unwrap();
        let config = project(temp.path());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (orchestrator, event_tx, shutdown_tx) =
            orchestrator(config, listener.local_addr().unwrap());

        // Watcher dies: the session must survive until Ctrl+C.
        drop(event_tx);
        let handle = tokio::spawn(orchestrator.run());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!handle.is_finished(), "session ended on watcher death");

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    /// One debounced change batch must produce exactly one restart and
    /// one reload token, delivered only after the replacement server is
    /// confirmed running.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_change_batch_restarts_then_notifies_client() {
        let temp = TempDir::new().unwrap();
        let config = project(temp.path());
        let template = temp.path().join("templates/index.html.jinja");

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let channel = LiveReloadChannel::start(0).unwrap();

        // Register a browser stand-in before the loop starts.
        let (mut client, _) =
            tungstenite::connect(format!("ws://127.0.0.1:{}", channel.port())).unwrap();
        if let MaybeTlsStream::Plain(stream) = client.get_ref() {
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .unwrap();
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while channel.client_count() < 1 {
            assert!(Instant::now() < deadline, "client never registered");
            std::thread::sleep(Duration::from_millis(20));
        }

        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let supervisor = Supervisor::new(listener.local_addr().unwrap(), sleeper());
        let orchestrator =
            DevOrchestrator::new(config, supervisor, channel, event_rx, shutdown_rx);
        let handle = tokio::spawn(orchestrator.run());

        // A burst of edits coalesces into a single cycle.
        for _ in 0..3 {
            event_tx
                .send(FsEvent {
                    kind: FsEventKind::Modified,
                    path: template.clone(),
                })
                .await
                .unwrap();
        }

        let message = client.read().unwrap();
        assert_eq!(message.to_text().unwrap(), RELOAD_TOKEN);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();

        // No second token: the burst produced one broadcast, and the
        // orderly shutdown only closes the connection.
        match client.read() {
            Ok(message) => assert!(!message.is_text()),
            Err(_) => {}
        }
    }
}
