//! Pure timing and deduplication for filesystem events.
//!
//! No business logic and no global state: events go in, coalesced
//! batches come out once the debounce window and restart cooldown have
//! both elapsed. A burst of events (multi-file save, `git checkout`)
//! therefore yields exactly one restart cycle.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::{FsEvent, FsEventKind};
use crate::debug;

/// Quiet period after the last event before a batch is released.
pub const DEBOUNCE_MS: u64 = 300;
/// Minimum spacing between two restart cycles.
pub const RESTART_COOLDOWN_MS: u64 = 800;

/// Coalesces rapid filesystem events into restart batches.
pub struct Debouncer {
    /// Path -> kind (dedup is free via map key uniqueness)
    changes: FxHashMap<PathBuf, FsEventKind>,
    last_event: Option<Instant>,
    last_restart: Option<Instant>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            last_restart: None,
        }
    }

    /// Record an event, applying dedup rules:
    /// - Deleted + Created/Modified -> the file was restored, keep the new event
    /// - Modified + Deleted -> upgrade to Deleted
    /// - Created + Deleted -> appeared then vanished, discard entirely
    /// - otherwise the first event wins
    pub fn add_event(&mut self, event: FsEvent) {
        if is_temp_file(&event.path) {
            return;
        }

        let FsEvent { kind, path } = event;

        if let Some(&existing) = self.changes.get(&path) {
            match (existing, kind) {
                (FsEventKind::Deleted, FsEventKind::Created | FsEventKind::Modified) => {
                    debug!("watch"; "restore {} -> {}: {}", existing.label(), kind.label(), path.display());
                    self.changes.insert(path, kind);
                }
                (FsEventKind::Modified | FsEventKind::Moved, FsEventKind::Deleted) => {
                    debug!("watch"; "upgrade {} -> deleted: {}", existing.label(), path.display());
                    self.changes.insert(path, FsEventKind::Deleted);
                }
                (FsEventKind::Created, FsEventKind::Deleted) => {
                    debug!("watch"; "discard created+deleted: {}", path.display());
                    self.changes.remove(&path);
                }
                _ => return,
            }
            self.last_event = Some(Instant::now());
            return;
        }

        debug!("watch"; "event {}: {}", kind.label(), path.display());
        self.changes.insert(path, kind);
        self.last_event = Some(Instant::now());
    }

    /// Take the pending batch if debounce + cooldown have elapsed.
    pub fn take_if_ready(&mut self) -> Option<Vec<(PathBuf, FsEventKind)>> {
        if !self.is_ready() {
            return None;
        }

        let changes = std::mem::take(&mut self.changes);
        self.last_event = None;

        if changes.is_empty() {
            return None;
        }

        self.last_restart = Some(Instant::now());
        let mut batch: Vec<_> = changes.into_iter().collect();
        batch.sort();
        Some(batch)
    }

    fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };

        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }

        if let Some(last_restart) = self.last_restart
            && last_restart.elapsed() < Duration::from_millis(RESTART_COOLDOWN_MS)
        {
            return false;
        }

        !self.changes.is_empty()
    }

    /// Precise sleep duration until the next possible ready time.
    pub fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(86400);
        };

        let debounce_remaining =
            Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());

        let cooldown_remaining = self
            .last_restart
            .map(|t| Duration::from_millis(RESTART_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: FsEventKind, path: &str) -> FsEvent {
        FsEvent {
            kind,
            path: PathBuf::from(path),
        }
    }

    #[test]
    fn test_empty_not_ready() {
        let debouncer = Debouncer::new();
        assert!(!Debouncer::new().is_ready());
        assert_eq!(debouncer.sleep_duration(), Duration::from_secs(86400));
    }

    #[test]
    fn test_not_ready_within_debounce_window() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/a.toml"));
        assert!(!debouncer.is_ready());
        assert!(debouncer.take_if_ready().is_none());
    }

    #[test]
    fn test_burst_coalesces_to_one_batch() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/a.toml"));
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/a.toml"));
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/b.toml"));

        // Force the window to have elapsed.
        debouncer.last_event = Some(Instant::now() - Duration::from_millis(DEBOUNCE_MS + 10));

        let batch = debouncer.take_if_ready().unwrap();
        assert_eq!(batch.len(), 2);
        // Deterministic path order.
        assert_eq!(batch[0].0, PathBuf::from("/tmp/a.toml"));
        assert_eq!(batch[1].0, PathBuf::from("/tmp/b.toml"));
        assert!(debouncer.take_if_ready().is_none());
    }

    #[test]
    fn test_cooldown_blocks_immediate_followup() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/a.toml"));
        debouncer.last_event = Some(Instant::now() - Duration::from_millis(DEBOUNCE_MS + 10));
        assert!(debouncer.take_if_ready().is_some());

        debouncer.add_event(event(FsEventKind::Modified, "/tmp/b.toml"));
        debouncer.last_event = Some(Instant::now() - Duration::from_millis(DEBOUNCE_MS + 10));
        // Cooldown from the first batch still applies.
        assert!(debouncer.take_if_ready().is_none());

        debouncer.last_restart =
            Some(Instant::now() - Duration::from_millis(RESTART_COOLDOWN_MS + 10));
        assert!(debouncer.take_if_ready().is_some());
    }

    #[test]
    fn test_restore_transition() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(event(FsEventKind::Deleted, "/tmp/a.toml"));
        debouncer.add_event(event(FsEventKind::Created, "/tmp/a.toml"));

        assert_eq!(
            debouncer.changes[&PathBuf::from("/tmp/a.toml")],
            FsEventKind::Created
        );
    }

    #[test]
    fn test_created_then_deleted_discards() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(event(FsEventKind::Created, "/tmp/a.toml"));
        debouncer.add_event(event(FsEventKind::Deleted, "/tmp/a.toml"));
        assert!(debouncer.changes.is_empty());
    }

    #[test]
    fn test_temp_files_ignored() {
        let mut debouncer = Debouncer::new();
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/.hidden.toml"));
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/a.toml.swp"));
        debouncer.add_event(event(FsEventKind::Modified, "/tmp/a.toml~"));
        assert!(debouncer.changes.is_empty());
    }
}
