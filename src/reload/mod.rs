//! Live-reload WebSocket channel.
//!
//! A long-lived endpoint that browser tabs connect to. The server side
//! never sends anything except the literal reload token after a restart
//! cycle completes; whatever a client sends on connect (the stock
//! script sends `REGISTER`) is drained and not interpreted.
//!
//! The channel runs on its own acceptor thread, independent of route
//! derivation and process supervision, and is stoppable on its own.

use crate::{debug, log};
use parking_lot::Mutex;
use std::io::ErrorKind;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

/// The literal token pushed to clients when a rebuild completes.
pub const RELOAD_TOKEN: &str = "RELOAD";

/// Maximum port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Acceptor poll interval while idle.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

/// Push-notification endpoint tracking connected browser tabs.
pub struct LiveReloadChannel {
    clients: Clients,
    port: u16,
    shutdown: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
}

impl LiveReloadChannel {
    /// Bind and start accepting clients. Tries `base_port` first, then
    /// the following ports before giving up.
    pub fn start(base_port: u16) -> anyhow::Result<Self> {
        let (listener, port) = try_bind_port(base_port, MAX_PORT_RETRIES)?;
        listener.set_nonblocking(true)?;

        let clients: Clients = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let acceptor = {
            let clients = Arc::clone(&clients);
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || accept_loop(listener, clients, shutdown))
        };

        Ok(Self {
            clients,
            port,
            shutdown,
            acceptor: Some(acceptor),
        })
    }

    /// The port actually bound (may differ from the configured one).
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Number of currently registered connections.
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Send the reload token to every registered connection.
    ///
    /// Connections that fail mid-send are dropped from the set without
    /// aborting delivery to the others. Returns the delivery count.
    pub fn broadcast(&self) -> usize {
        let mut clients = self.clients.lock();
        let mut sent = 0;

        clients.retain_mut(|ws| match ws.send(Message::text(RELOAD_TOKEN)) {
            Ok(()) => {
                sent += 1;
                true
            }
            Err(e) => {
                debug!("reload"; "client dropped during broadcast: {}", e);
                false
            }
        });

        sent
    }

    /// Stop accepting clients and close every open connection.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }

        let mut clients = self.clients.lock();
        for mut ws in clients.drain(..) {
            let _ = ws.close(None);
        }
    }
}

impl Drop for LiveReloadChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept clients and reap dead connections until shutdown.
fn accept_loop(listener: TcpListener, clients: Clients, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }

        match listener.accept() {
            Ok((stream, addr)) => {
                debug!("reload"; "client connected: {}", addr);
                register_client(stream, &clients);
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
                reap_clients(&clients);
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                log!("reload"; "accept error: {}", e);
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Handshake a raw TCP stream and add it to the connection set.
///
/// The handshake runs in blocking mode; afterwards the socket switches
/// to non-blocking so reaping polls never stall the acceptor.
fn register_client(stream: TcpStream, clients: &Clients) {
    let _ = stream.set_nonblocking(false);
    match tungstenite::accept(stream) {
        Ok(ws) => {
            let _ = ws.get_ref().set_nonblocking(true);
            clients.lock().push(ws);
        }
        Err(e) => {
            log!("reload"; "handshake failed: {}", e);
        }
    }
}

/// Drop closed connections and drain client chatter.
///
/// Clients may send a registration message on connect; its content is
/// not part of the contract, so it is read and discarded.
fn reap_clients(clients: &Clients) {
    let mut clients = clients.lock();
    clients.retain_mut(|ws| match ws.read() {
        Ok(Message::Close(_)) => {
            debug!("reload"; "client disconnected");
            false
        }
        Ok(_) => true,
        Err(tungstenite::Error::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => true,
        Err(e) => {
            debug!("reload"; "client dropped: {}", e);
            false
        }
    });
}

/// Try binding to port, retry with incremented port if in use.
fn try_bind_port(base_port: u16, max_retries: u16) -> anyhow::Result<(TcpListener, u16)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(listener) => {
                let actual_port = listener.local_addr()?.port();
                return Ok((listener, actual_port));
            }
            Err(e) => {
                last_error = Some(e);
                continue;
            }
        }
    }

    Err(anyhow::anyhow!(
        "failed to bind reload channel after {} attempts: {}",
        max_retries,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn connect(port: u16) -> WebSocket<tungstenite::stream::MaybeTlsStream<TcpStream>> {
        let (ws, _) = tungstenite::connect(format!("ws://127.0.0.1:{port}")).unwrap();
        ws
    }

    fn wait_for_clients(channel: &LiveReloadChannel, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while channel.client_count() < n {
            assert!(Instant::now() < deadline, "clients never registered");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_broadcast_reaches_registered_clients() {
        let channel = LiveReloadChannel::start(0).unwrap();
        let mut first = connect(channel.port());
        let mut second = connect(channel.port());
        wait_for_clients(&channel, 2);

        assert_eq!(channel.broadcast(), 2);
        assert_eq!(first.read().unwrap().to_text().unwrap(), RELOAD_TOKEN);
        assert_eq!(second.read().unwrap().to_text().unwrap(), RELOAD_TOKEN);
    }

    #[test]
    fn test_disconnect_does_not_abort_broadcast() {
        let channel = LiveReloadChannel::start(0).unwrap();
        let dropped = connect(channel.port());
        let mut kept = connect(channel.port());
        wait_for_clients(&channel, 2);

        drop(dropped);
        // First broadcast may still see the dead socket buffered; the
        // surviving client must receive the token regardless.
        channel.broadcast();
        assert_eq!(kept.read().unwrap().to_text().unwrap(), RELOAD_TOKEN);
    }

    #[test]
    fn test_registration_message_ignored() {
        let channel = LiveReloadChannel::start(0).unwrap();
        let mut client = connect(channel.port());
        wait_for_clients(&channel, 1);

        client.send(Message::text("REGISTER")).unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert_eq!(channel.client_count(), 1);
        assert_eq!(channel.broadcast(), 1);
        assert_eq!(client.read().unwrap().to_text().unwrap(), RELOAD_TOKEN);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut channel = LiveReloadChannel::start(0).unwrap();
        channel.stop();
        channel.stop();
        assert_eq!(channel.client_count(), 0);
    }
}
