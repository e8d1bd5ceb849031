//! Filesystem watching.
//!
//! Wraps `notify` behind a tagged event type delivered over a channel,
//! so the orchestrator consumes plain data instead of watcher callbacks:
//!
//! ```text
//! notify -> std channel -> bridge thread -> tokio channel -> Debouncer
//! ```
//!
//! The watcher starts buffering events as soon as it is created, so
//! changes made during the initial build are not lost.

mod debouncer;

pub use debouncer::{DEBOUNCE_MS, Debouncer, RESTART_COOLDOWN_MS};

use crate::log;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// What happened to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FsEventKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl FsEventKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Moved => "moved",
        }
    }
}

/// One tagged filesystem change.
#[derive(Debug, Clone)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

/// Keeps the watcher alive; dropping it stops event delivery.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
}

/// Watch `root` recursively, forwarding tagged events into `tx`.
///
/// Watch errors are logged and end the bridge thread; the rest of the
/// pipeline (and the running preview server) is unaffected.
pub fn spawn(root: &Path, tx: mpsc::Sender<FsEvent>) -> notify::Result<FsWatcher> {
    // notify delivers on its own thread; bridge sync -> async.
    let (notify_tx, notify_rx) = std::sync::mpsc::channel();

    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })?;
    watcher.watch(root, RecursiveMode::Recursive)?;

    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            match result {
                Ok(event) => {
                    for fs_event in classify(event) {
                        if tx.blocking_send(fs_event).is_err() {
                            return; // Receiver dropped
                        }
                    }
                }
                Err(e) => {
                    log!("watch"; "watcher error: {}", e);
                    return;
                }
            }
        }
    });

    Ok(FsWatcher { _watcher: watcher })
}

/// Map a raw notify event onto tagged events, one per affected path.
///
/// Metadata-only modifications are dropped; they are mtime/chmod noise
/// that would otherwise trigger endless restart loops.
fn classify(event: notify::Event) -> Vec<FsEvent> {
    use notify::EventKind;
    use notify::event::ModifyKind;

    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Created,
        EventKind::Remove(_) => FsEventKind::Deleted,
        EventKind::Modify(ModifyKind::Metadata(_)) => return Vec::new(),
        EventKind::Modify(ModifyKind::Name(_)) => FsEventKind::Moved,
        EventKind::Modify(_) => FsEventKind::Modified,
        _ => return Vec::new(),
    };

    event
        .paths
        .into_iter()
        .map(|path| FsEvent { kind, path })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RenameMode};

    fn raw(kind: notify::EventKind, paths: Vec<&str>) -> notify::Event {
        notify::Event {
            kind,
            paths: paths.into_iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_classify_kinds() {
        let events = classify(raw(
            notify::EventKind::Create(CreateKind::File),
            vec!["/tmp/a.toml"],
        ));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, FsEventKind::Created);

        let events = classify(raw(
            notify::EventKind::Modify(ModifyKind::Name(RenameMode::Any)),
            vec!["/tmp/a.toml", "/tmp/b.toml"],
        ));
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.kind == FsEventKind::Moved));
    }

    #[test]
    fn test_classify_drops_metadata_noise() {
        let events = classify(raw(
            notify::EventKind::Modify(ModifyKind::Metadata(MetadataKind::Any)),
            vec!["/tmp/a.toml"],
        ));
        assert!(events.is_empty());

        let events = classify(raw(
            notify::EventKind::Modify(ModifyKind::Data(DataChange::Any)),
            vec!["/tmp/a.toml"],
        ));
        assert_eq!(events[0].kind, FsEventKind::Modified);
    }
}
