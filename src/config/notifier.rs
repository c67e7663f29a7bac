//! File system notifications as tokio channels.
//!
//! Wraps a `notify` watcher: its callback runs on notify's own thread and
//! forwards every event and error into unbounded channels that an async
//! task can `select!` on. Dropping the [`FileNotifier`] stops the watcher
//! and closes both channels.

use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// A change observed on a watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Kind of change, in the vocabulary the watch loop understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Write,
    /// Also emitted when an entry is renamed into place.
    Create,
    Remove,
    Rename,
    Chmod,
}

impl FileEventKind {
    /// Map a notify event kind. Access notifications and paired rename
    /// summaries yield `None`.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(FileEventKind::Create),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(FileEventKind::Create),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => None,
            EventKind::Modify(ModifyKind::Name(_)) => Some(FileEventKind::Rename),
            EventKind::Modify(ModifyKind::Metadata(_)) => Some(FileEventKind::Chmod),
            EventKind::Modify(_) => Some(FileEventKind::Write),
            EventKind::Remove(_) => Some(FileEventKind::Remove),
            _ => None,
        }
    }
}

/// Receiving side of a [`FileNotifier`].
pub struct NotifierStreams {
    pub events: mpsc::UnboundedReceiver<FileEvent>,
    pub errors: mpsc::UnboundedReceiver<notify::Error>,
}

#[cfg(test)]
thread_local! {
    static FAIL_NEXT: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Make the next `FileNotifier::new` on this thread fail.
#[cfg(test)]
pub(crate) fn fail_next_construction() {
    FAIL_NEXT.with(|fail| fail.set(true));
}

/// Non-recursive watcher over individual paths.
pub struct FileNotifier {
    watcher: RecommendedWatcher,
}

impl FileNotifier {
    /// Create the OS watcher and the channels it feeds.
    pub fn new() -> Result<(Self, NotifierStreams), notify::Error> {
        #[cfg(test)]
        if FAIL_NEXT.with(|fail| fail.replace(false)) {
            return Err(notify::Error::generic("notifier construction disabled"));
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(kind) = FileEventKind::from_notify(&event.kind) else {
                    return;
                };
                for path in event.paths {
                    let _ = event_tx.send(FileEvent { path, kind });
                }
            }
            Err(e) => {
                let _ = error_tx.send(e);
            }
        })?;

        Ok((Self { watcher }, NotifierStreams { events, errors }))
    }

    /// Start observing `path`. Fails if the path does not exist.
    pub fn add(&mut self, path: &Path) -> Result<(), notify::Error> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)
    }

    /// Stop observing `path`.
    pub fn remove(&mut self, path: &Path) -> Result<(), notify::Error> {
        self.watcher.unwatch(path)
    }
}
