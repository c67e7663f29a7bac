//! Watch loop for one named configuration.
//!
//! # Responsibilities
//! - Register the backing file (and its directory in a cluster) with the notifier
//! - Turn file system events into reloads
//! - Keep watching a file that was removed and later recreated
//!
//! # Design Decisions
//! - The loop reports once its paths are registered, so `make_config`
//!   returns only after writes to the file can be observed
//! - A removal carries no content; it reloads only when the file is
//!   already back by the time the watch is re-armed
//! - If the file is gone when the watch is re-armed, its directory is
//!   watched until the file shows up again

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::config::notifier::{FileEvent, FileEventKind, FileNotifier, NotifierStreams};
use crate::config::Config;
use crate::lifecycle::ShutdownSignal;
use crate::manager::{ConfigName, Manager};
use crate::observability::logging::Logger;

/// Entry created by ConfigMap volume mounts when the mounted files are swapped.
pub const CONFIGMAP_MARKER: &str = "..data";

/// What the watch loop does with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    Reload,
    /// Register the file again; the OS stops tracking a removed path.
    Rearm,
    Ignore,
}

/// Decide how an event affects the configuration backed by `config_file`.
pub fn classify(event: &FileEvent, config_file: &Path) -> WatchAction {
    let on_file = event.path == config_file;

    match event.kind {
        FileEventKind::Write | FileEventKind::Create if on_file => WatchAction::Reload,
        FileEventKind::Create
            if event.path.file_name() == Some(OsStr::new(CONFIGMAP_MARKER)) =>
        {
            WatchAction::Reload
        }
        FileEventKind::Remove if on_file => WatchAction::Rearm,
        _ => WatchAction::Ignore,
    }
}

pub(crate) struct Watcher<K, C> {
    manager: Manager<K, C>,
    name: K,
    logger: Arc<dyn Logger>,
    config_file: PathBuf,
    watch_dir: Option<PathBuf>,
    notifier: FileNotifier,
    cluster_mode: bool,
    /// The file could not be re-registered and its directory stands in for it.
    watching_dir_for_file: bool,
}

impl<K: ConfigName, C: Config> Watcher<K, C> {
    pub(crate) fn new(
        manager: Manager<K, C>,
        name: K,
        config_file: PathBuf,
        notifier: FileNotifier,
        cluster_mode: bool,
    ) -> Self {
        let config_file = std::path::absolute(&config_file).unwrap_or(config_file);
        let watch_dir = config_file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);
        let logger = Arc::clone(manager.logger());

        Self {
            manager,
            name,
            logger,
            config_file,
            watch_dir,
            notifier,
            cluster_mode,
            watching_dir_for_file: false,
        }
    }

    /// Register the paths, report readiness, then process events until
    /// shutdown or until the notifier streams close.
    pub(crate) async fn run(
        mut self,
        mut streams: NotifierStreams,
        mut shutdown: ShutdownSignal,
        ready: oneshot::Sender<Result<(), notify::Error>>,
    ) {
        if let Err(e) = self.establish() {
            // Nobody is waiting any more; setup errors are still fatal.
            if let Err(Err(e)) = ready.send(Err(e)) {
                self.logger.fatal(format_args!("watching config file: {e}"));
            }
            return;
        }
        let _ = ready.send(Ok(()));

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    self.logger.debug(format_args!(
                        "stopped watching `{}`",
                        self.config_file.display()
                    ));
                    break;
                }
                error = streams.errors.recv() => match error {
                    Some(e) => self.logger.error(format_args!("file watcher: {e}")),
                    None => {
                        self.logger.error(format_args!("file watcher error stream has been closed"));
                        break;
                    }
                },
                event = streams.events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => {
                        self.logger.error(format_args!("file watcher event stream has been closed"));
                        break;
                    }
                },
            }
        }
    }

    fn establish(&mut self) -> Result<(), notify::Error> {
        self.logger.debug(format_args!(
            "watching config file `{}`",
            self.config_file.display()
        ));
        self.notifier.add(&self.config_file)?;

        if self.cluster_mode {
            if let Some(dir) = self.watch_dir.as_deref() {
                self.logger.info(format_args!(
                    "in kubernetes context, adding `{}` to the watch list",
                    dir.display()
                ));
                self.notifier.add(dir)?;
            }
        }

        Ok(())
    }

    async fn handle(&mut self, event: FileEvent) {
        self.logger.trace(format_args!(
            "file watcher: {} -> {:?}",
            event.path.display(),
            event.kind
        ));

        match classify(&event, &self.config_file) {
            WatchAction::Reload => {
                if event.path == self.config_file {
                    let what = match event.kind {
                        FileEventKind::Create => "created",
                        _ => "changed",
                    };
                    self.logger.debug(format_args!("config file {what}"));
                    if self.watching_dir_for_file {
                        self.restore_file_watch();
                    }
                } else {
                    self.logger.debug(format_args!("configmap volume updated"));
                }

                self.logger.info(format_args!("reloading config `{:?}`", self.name));
                self.reload().await;
            }
            WatchAction::Rearm => self.rearm().await,
            WatchAction::Ignore => {}
        }
    }

    async fn rearm(&mut self) {
        self.logger.debug(format_args!("config file removed"));

        let Err(e) = self.notifier.add(&self.config_file) else {
            // Already back, through a fast recreate or a rename over the file;
            // its create event went to no watch.
            self.logger.debug(format_args!("config file recreated"));
            self.logger.info(format_args!("reloading config `{:?}`", self.name));
            self.reload().await;
            return;
        };
        self.logger.debug(format_args!(
            "config file `{}` not watchable yet: {e}",
            self.config_file.display()
        ));

        let Some(dir) = self.watch_dir.as_deref() else {
            self.logger.error(format_args!("file watcher: {e}"));
            return;
        };

        if !self.cluster_mode {
            if let Err(e) = self.notifier.add(dir) {
                self.logger.error(format_args!("file watcher: {e}"));
                return;
            }
        }
        self.watching_dir_for_file = true;
    }

    fn restore_file_watch(&mut self) {
        if let Err(e) = self.notifier.add(&self.config_file) {
            self.logger.error(format_args!("file watcher: {e}"));
            return;
        }
        self.watching_dir_for_file = false;

        if self.cluster_mode {
            return;
        }
        if let Some(dir) = self.watch_dir.as_deref() {
            if let Err(e) = self.notifier.remove(dir) {
                self.logger.debug(format_args!("unwatching `{}`: {e}", dir.display()));
            }
        }
    }

    async fn reload(&self) {
        let Some(current) = self.manager.get_config(&self.name).await else {
            return;
        };

        let mut next = current.deep_copy();
        if let Err(e) = self.manager.loader().load(&mut next) {
            self.logger.error(format_args!("error while loading conf: {e}"));
            return;
        }

        self.manager.commit_reload(&self.name, next).await;
    }
}
