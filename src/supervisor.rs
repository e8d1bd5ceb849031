//! Render-server process lifecycle.
//!
//! The preview server runs as a separate OS process so a renderer crash
//! can never take down the orchestrator. The supervisor owns at most
//! one child at a time and moves it through an explicit state machine:
//!
//! ```text
//! Stopped -> Starting -> Running -> Stopping -> Stopped
//! ```
//!
//! `start` hands the child an immutable route-table snapshot (a JSON
//! temp file) and waits for readiness with a bounded TCP probe; a child
//! that fails to accept within the window is killed and reported rather
//! than left hanging. `stop` always kills and reaps the child, on every
//! exit path including drop, so sockets and file handles are released.

use crate::debug;
use crate::route::RouteTable;
use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::process::{Child, Command, ExitStatus};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;

/// How long a starting child may take to accept connections.
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Readiness probe interval.
const PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Process lifecycle errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to spawn render server")]
    Spawn(#[source] std::io::Error),

    #[error("render server exited during startup ({0})")]
    Exited(ExitStatus),

    #[error("render server did not accept connections within {0:?}")]
    NotReady(Duration),

    #[error("failed to write route snapshot")]
    Snapshot(#[source] std::io::Error),

    #[error("i/o error while managing render server")]
    Io(#[source] std::io::Error),
}

/// Lifecycle state of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Builds the OS command that launches one render-server bound to a
/// route snapshot. Injected so tests can supervise an arbitrary child.
pub type CommandBuilder = Box<dyn Fn(&std::path::Path) -> Command + Send>;

/// Owns zero or one live render-server process.
pub struct Supervisor {
    build_command: CommandBuilder,
    probe_addr: SocketAddr,
    child: Option<Child>,
    state: ProcessState,
    /// Snapshot file backing the running child; kept alive until stop.
    snapshot: Option<NamedTempFile>,
}

impl Supervisor {
    pub fn new(probe_addr: SocketAddr, build_command: CommandBuilder) -> Self {
        Self {
            build_command,
            probe_addr,
            child: None,
            state: ProcessState::Stopped,
            snapshot: None,
        }
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ProcessState::Running
    }

    /// Spawn a render server bound to the given route table and wait
    /// until it is ready. Must be called from `Stopped`.
    pub fn start(&mut self, table: &RouteTable) -> Result<(), SupervisorError> {
        assert_eq!(
            self.state,
            ProcessState::Stopped,
            "start requires a fully stopped supervisor"
        );

        let snapshot = write_snapshot(table)?;
        self.state = ProcessState::Starting;
        debug!("dev"; "starting render server ({} routes)", table.len());

        let mut command = (self.build_command)(snapshot.path());
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                self.state = ProcessState::Stopped;
                return Err(SupervisorError::Spawn(e));
            }
        };
        self.child = Some(child);
        self.snapshot = Some(snapshot);

        match self.wait_ready() {
            Ok(()) => {
                self.state = ProcessState::Running;
                Ok(())
            }
            Err(e) => {
                self.force_stop();
                Err(e)
            }
        }
    }

    /// Gracefully terminate the child and block until it has exited.
    /// Idempotent: stopping an already-stopped supervisor is a no-op.
    pub fn stop(&mut self) -> Result<(), SupervisorError> {
        let Some(mut child) = self.child.take() else {
            self.state = ProcessState::Stopped;
            return Ok(());
        };

        self.state = ProcessState::Stopping;
        // An immediate kill loses nothing: the child holds no mutable
        // state and its snapshot file is owned by this process.
        child.kill().map_err(SupervisorError::Io)?;
        child.wait().map_err(SupervisorError::Io)?;

        self.snapshot = None;
        self.state = ProcessState::Stopped;
        debug!("dev"; "render server stopped");
        Ok(())
    }

    /// `stop` followed by `start`. Serialized by the orchestrator, so
    /// no two restarts ever interleave their stop/start sequences.
    pub fn restart(&mut self, table: &RouteTable) -> Result<(), SupervisorError> {
        self.stop()?;
        self.start(table)
    }

    /// Poll until the child accepts a TCP connection or the ready
    /// window closes. A child that exits early is reported as such.
    fn wait_ready(&mut self) -> Result<(), SupervisorError> {
        let deadline = Instant::now() + READY_TIMEOUT;

        loop {
            if let Some(child) = self.child.as_mut()
                && let Some(status) = child.try_wait().map_err(SupervisorError::Io)?
            {
                return Err(SupervisorError::Exited(status));
            }

            if TcpStream::connect_timeout(&self.probe_addr, PROBE_INTERVAL).is_ok() {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(SupervisorError::NotReady(READY_TIMEOUT));
            }
            std::thread::sleep(PROBE_INTERVAL);
        }
    }

    /// Best-effort kill + reap, used on failed starts and drop.
    fn force_stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.snapshot = None;
        self.state = ProcessState::Stopped;
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.force_stop();
    }
}

/// Serialize the route table to a temp file the child reads at startup.
fn write_snapshot(table: &RouteTable) -> Result<NamedTempFile, SupervisorError> {
    let mut file = NamedTempFile::new().map_err(SupervisorError::Snapshot)?;
    let bytes = serde_json::to_vec(table)
        .map_err(|e| SupervisorError::Snapshot(std::io::Error::other(e)))?;
    file.write_all(&bytes).map_err(SupervisorError::Snapshot)?;
    file.flush().map_err(SupervisorError::Snapshot)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    /// A long-sleeping child stands in for the render server; the probe
    /// address points at a listener owned by the test instead.
    fn sleeper() -> CommandBuilder {
        Box::new(|_snapshot| {
            let mut cmd = Command::new("sleep");
            cmd.arg("30");
            cmd
        })
    }

    /// A child that dies immediately, before ever accepting.
    fn crasher() -> CommandBuilder {
        Box::new(|_snapshot| {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "exit 7"]);
            cmd
        })
    }

    fn unused_addr() -> SocketAddr {
        // Bind then drop to find a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    }

    #[test]
    fn test_start_then_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut supervisor = Supervisor::new(addr, sleeper());
        assert_eq!(supervisor.state(), ProcessState::Stopped);

        supervisor.start(&RouteTable::default()).unwrap();
        assert!(supervisor.is_running());

        supervisor.stop().unwrap();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut supervisor = Supervisor::new(unused_addr(), sleeper());
        supervisor.stop().unwrap();
        supervisor.stop().unwrap();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
    }

    #[test]
    fn test_child_exit_reported() {
        let mut supervisor = Supervisor::new(unused_addr(), crasher());
        let err = supervisor.start(&RouteTable::default()).unwrap_err();
        assert!(matches!(err, SupervisorError::Exited(_)));
        // Error path still lands back in Stopped with no child leaked.
        assert_eq!(supervisor.state(), ProcessState::Stopped);
    }

    #[test]
    fn test_restart_replaces_child() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let mut supervisor = Supervisor::new(addr, sleeper());
        supervisor.start(&RouteTable::default()).unwrap();
        let first_pid = supervisor.child.as_ref().unwrap().id();

        supervisor.restart(&RouteTable::default()).unwrap();
        let second_pid = supervisor.child.as_ref().unwrap().id();

        assert!(supervisor.is_running());
        assert_ne!(first_pid, second_pid);
        supervisor.stop().unwrap();
    }
}
