//! Configuration contract, loading and file watching.
//!
//! # Data Flow
//! ```text
//! process arguments (clap)
//!     → loader.rs (overlay CLI values onto the target)
//!     → format.rs (decode the backing file by extension, overlay it)
//!     → validation.rs (validator chain, then applier chain)
//!     → published as Arc<C>, never mutated again
//!
//! On a file system event:
//!     notifier.rs forwards notify events into tokio channels
//!     → watcher.rs classifies the event
//!     → reload: deep copy current → load → validate → apply → commit → broadcast
//! ```
//!
//! # Design Decisions
//! - A configuration is any serde type; file content is merged over the
//!   current value instead of replacing it, so CLI values survive unless
//!   the file sets the same key
//! - Published values are shared behind `Arc`, which makes in-place
//!   mutation after publication impossible
//! - One watch task per named configuration, so reloads for a name are
//!   strictly sequential

pub mod format;
pub mod loader;
pub mod notifier;
pub mod validation;
pub mod watcher;

use std::path::Path;

use clap::Parser;
use serde::{de::DeserializeOwned, Serialize};

pub use format::Format;
pub use loader::Loader;
pub use notifier::{FileEvent, FileEventKind, FileNotifier};
pub use validation::{Applier, Validator};
pub use watcher::{classify, WatchAction};

/// A configuration value managed by [`Manager`](crate::Manager).
///
/// Applications with several kinds of configuration use an enum and match
/// on the variant inside their validators and appliers.
pub trait Config: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Command line options overlaid onto the configuration on every load.
    type Args: Parser;

    /// Path of the backing file. `None` (or an empty path) disables both the
    /// file decode and the watch task.
    fn config_file(&self) -> Option<&Path>;

    /// Copy the parsed command line values that were actually given onto `self`.
    fn apply_args(&mut self, args: Self::Args);

    /// Independent copy used as the starting point of a reload.
    fn deep_copy(&self) -> Self {
        self.clone()
    }
}

/// Command line options for configurations that take none.
#[derive(Debug, Clone, Default, Parser)]
pub struct NoArgs {}

/// The backing file of `config`, with empty paths treated as absent.
pub(crate) fn watched_file<C: Config>(config: &C) -> Option<&Path> {
    config
        .config_file()
        .filter(|path| !path.as_os_str().is_empty())
}
