//! Registry of named configurations.
//!
//! # Data Flow
//! ```text
//! make_config(name, initial)
//!     → Loader (CLI, then file)
//!     → validators(None, new) → appliers(None, new)
//!     → commit Arc<C> under `name`
//!     → spawn watch loop, wait for it to report the watch is established
//!
//! watch loop reload(name)
//!     → deep copy + load outside the lock
//!     → [write lock] validators → appliers → commit → broadcast [unlock]
//! ```
//!
//! # Design Decisions
//! - One lock for every map and every current value; reads share it,
//!   mutations and broadcasts take it exclusively
//! - Validators and appliers run under the exclusive lock during a reload,
//!   so `get_config` never sees a value that is validated but not committed,
//!   and a broadcast value is always already visible to `get_config`
//! - Callbacks must not call back into the manager: the lock is held
//! - A name is committed only once its initial load, validation and
//!   application succeeded, so a failed `make_config` can be retried

mod global;
mod options;
mod registry;

use std::fmt;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, RwLock};

use crate::config::notifier::{FileNotifier, NotifierStreams};
use crate::config::validation::{run_appliers, run_validators};
use crate::config::watcher::Watcher;
use crate::config::{watched_file, Applier, Config, Loader, Validator};
use crate::error::{BoxError, ManagerError};
use crate::lifecycle::Shutdown;
use crate::observability::logging::Logger;

pub use options::{ManagerBuilder, ManagerOptions, CLUSTER_ENV};
use registry::Registry;

/// Identifier of a named configuration.
pub trait ConfigName: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> ConfigName for T where T: Eq + Hash + Clone + fmt::Debug + Send + Sync + 'static {}

/// Receiving end of [`Manager::new_config_chan`].
pub type ConfigReceiver<C> = mpsc::Receiver<Arc<C>>;

/// Owns every named configuration, its callback chains and its subscribers.
///
/// Cloning is cheap and yields a handle to the same registry.
pub struct Manager<K, C> {
    inner: Arc<Inner<K, C>>,
}

struct Inner<K, C> {
    logger: Arc<dyn Logger>,
    loader: Loader,
    options: ManagerOptions,
    registry: RwLock<Registry<K, C>>,
}

impl<K, C> Clone for Manager<K, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K: ConfigName, C: Config> Manager<K, C> {
    /// Create a manager reading the process arguments, with default options.
    pub fn new(logger: Arc<dyn Logger>) -> Self {
        ManagerBuilder::new().logger(logger).build()
    }

    pub(crate) fn from_parts(logger: Arc<dyn Logger>, loader: Loader, options: ManagerOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                logger,
                loader,
                options,
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.inner.logger
    }

    pub(crate) fn loader(&self) -> &Loader {
        &self.inner.loader
    }

    /// Whether both handles point to the same registry.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register `name`, load it and, if it has a backing file, start watching it.
    ///
    /// The validators and appliers registered for `name` at this point run
    /// with no current value. On any failure nothing is registered and the
    /// call can be retried. The watch loop stops when `shutdown` triggers.
    ///
    /// A failure to register the path with the OS watcher is logged at fatal
    /// level, which terminates the process.
    pub async fn make_config(
        &self,
        shutdown: &Shutdown,
        name: K,
        mut config: C,
    ) -> Result<(), ManagerError> {
        let logger = &self.inner.logger;
        let mut registry = self.inner.registry.write().await;

        if registry.configs.contains_key(&name) {
            return Err(ManagerError::AlreadyExists {
                name: format!("{name:?}"),
            });
        }

        // Built before any callback runs, so a watcher failure has no side effects.
        let notifier = FileNotifier::new()?;

        self.inner.loader.load(&mut config)?;

        let errors = run_validators(registry.validators_for(&name), None, &config);
        if !errors.is_empty() {
            for e in &errors {
                logger.error(format_args!("error while validating new conf: {e}"));
            }
            return Err(ManagerError::NotApplied { errors });
        }

        if let Err(e) = run_appliers(registry.appliers_for(&name), None, &mut config) {
            logger.error(format_args!("error while applying new conf: {e}"));
            return Err(ManagerError::Apply(e));
        }

        let watch = watched_file(&config).map(|path| (path.to_path_buf(), notifier));

        registry.configs.insert(name.clone(), Arc::new(config));
        drop(registry);

        logger.debug(format_args!("configuration `{name:?}` created"));

        if let Some((path, (notifier, streams))) = watch {
            self.start_watching(shutdown, name, path, notifier, streams)
                .await;
        }

        Ok(())
    }

    async fn start_watching(
        &self,
        shutdown: &Shutdown,
        name: K,
        path: PathBuf,
        notifier: FileNotifier,
        streams: NotifierStreams,
    ) {
        let logger = &self.inner.logger;
        let (ready_tx, ready_rx) = oneshot::channel();
        let watcher = Watcher::new(
            self.clone(),
            name,
            path,
            notifier,
            self.inner.options.in_cluster(),
        );

        tokio::spawn(watcher.run(streams, shutdown.subscribe(), ready_tx));

        let timeout = self.inner.options.ready_timeout();
        match tokio::time::timeout(timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => logger.fatal(format_args!("watching config file: {e}")),
            Ok(Err(_)) => logger.error(format_args!(
                "watch task exited before the config file was watched"
            )),
            Err(_) => logger.warn(format_args!(
                "config file watch not confirmed within {timeout:?}, continuing"
            )),
        }
    }

    /// Current value of `name`, if registered.
    ///
    /// The returned value is shared with every other reader; use
    /// [`Config::deep_copy`] to get a working copy.
    pub async fn get_config(&self, name: &K) -> Option<Arc<C>> {
        self.inner.registry.read().await.configs.get(name).cloned()
    }

    /// Whether `make_config` succeeded for `name`.
    pub async fn is_registered(&self, name: &K) -> bool {
        self.inner.registry.read().await.configs.contains_key(name)
    }

    /// Every registered name, in no particular order.
    pub async fn names(&self) -> Vec<K> {
        self.inner
            .registry
            .read()
            .await
            .configs
            .keys()
            .cloned()
            .collect()
    }

    /// Subscribe to new values of `name`.
    ///
    /// Delivers one value per successful reload that happens after this
    /// call, in reload order; the value current at subscription time is not
    /// replayed. Broadcasts wait for the receiver while holding the registry
    /// lock: a subscriber must keep receiving promptly, or every reload and
    /// registry operation in the process stalls. Dropping the receiver
    /// unsubscribes it.
    pub async fn new_config_chan(&self, name: K) -> ConfigReceiver<C> {
        let (tx, rx) = mpsc::channel(self.inner.options.channel_capacity());
        self.inner
            .registry
            .write()
            .await
            .subscribers
            .entry(name)
            .or_default()
            .push(tx);
        rx
    }

    /// Append validators to the chain of `name`.
    ///
    /// Only chains in place when `make_config` runs govern the initial load.
    pub async fn add_validators<I>(&self, name: K, validators: I)
    where
        I: IntoIterator<Item = Validator<C>>,
    {
        self.inner
            .registry
            .write()
            .await
            .validators
            .entry(name)
            .or_default()
            .extend(validators);
    }

    /// Append a single validator closure to the chain of `name`.
    pub async fn add_validator<F>(&self, name: K, validator: F)
    where
        F: Fn(Option<&C>, &C) -> Vec<BoxError> + Send + Sync + 'static,
    {
        let validator: Validator<C> = Box::new(validator);
        self.add_validators(name, [validator]).await;
    }

    /// Append appliers to the chain of `name`.
    pub async fn add_appliers<I>(&self, name: K, appliers: I)
    where
        I: IntoIterator<Item = Applier<C>>,
    {
        self.inner
            .registry
            .write()
            .await
            .appliers
            .entry(name)
            .or_default()
            .extend(appliers);
    }

    /// Append a single applier closure to the chain of `name`.
    pub async fn add_applier<F>(&self, name: K, applier: F)
    where
        F: Fn(Option<&C>, &mut C) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let applier: Applier<C> = Box::new(applier);
        self.add_appliers(name, [applier]).await;
    }

    /// Validate, apply, commit and broadcast a freshly loaded value for `name`.
    ///
    /// Runs entirely under the exclusive lock. On any failure the current
    /// value stays in place and nothing is broadcast. Returns whether the
    /// value was committed.
    pub(crate) async fn commit_reload(&self, name: &K, mut next: C) -> bool {
        let logger = self.inner.logger.as_ref();
        let mut guard = self.inner.registry.write().await;
        let registry = &mut *guard;

        let Some(current) = registry.configs.get(name).cloned() else {
            logger.warn(format_args!("configuration `{name:?}` is not registered"));
            return false;
        };

        let errors = run_validators(registry.validators_for(name), Some(&*current), &next);
        if !errors.is_empty() {
            for e in &errors {
                logger.error(format_args!("error while validating new conf: {e}"));
            }
            logger.error(format_args!(
                "new configuration not applied because error(s) have been found"
            ));
            return false;
        }

        if let Err(e) = run_appliers(registry.appliers_for(name), Some(&*current), &mut next) {
            logger.error(format_args!("error while applying new conf: {e}"));
            return false;
        }

        let published = Arc::new(next);
        registry.configs.insert(name.clone(), Arc::clone(&published));
        registry.broadcast(name, &published, logger).await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NoArgs;
    use crate::observability::logging::TracingLogger;
    use serde::{Deserialize, Serialize};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Limits {
        file: Option<PathBuf>,
        verbose: Vec<bool>,
    }

    impl Config for Limits {
        type Args = NoArgs;

        fn config_file(&self) -> Option<&Path> {
            self.file.as_deref()
        }

        fn apply_args(&mut self, _args: NoArgs) {}
    }

    fn manager() -> Manager<&'static str, Limits> {
        ManagerBuilder::new()
            .logger(Arc::new(TracingLogger))
            .args(["test"])
            .build()
    }

    fn limits(n: usize) -> Limits {
        Limits {
            file: None,
            verbose: vec![true; n],
        }
    }

    fn at_most_six(_: Option<&Limits>, new: &Limits) -> Vec<BoxError> {
        if new.verbose.len() > 6 {
            vec![format!("verbose `{}` can not be greater than 6", new.verbose.len()).into()]
        } else {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_make_and_get() {
        let manager = manager();
        let shutdown = Shutdown::new();

        assert!(manager.get_config(&"app").await.is_none());
        manager.make_config(&shutdown, "app", limits(2)).await.unwrap();

        let config = manager.get_config(&"app").await.unwrap();
        assert_eq!(config.verbose.len(), 2);
        assert!(manager.is_registered(&"app").await);
        assert_eq!(manager.names().await, vec!["app"]);
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let manager = manager();
        let shutdown = Shutdown::new();

        manager.make_config(&shutdown, "app", limits(1)).await.unwrap();
        let err = manager
            .make_config(&shutdown, "app", limits(5))
            .await
            .unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(manager.get_config(&"app").await.unwrap().verbose.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_validation_leaves_name_free() {
        let manager = manager();
        let shutdown = Shutdown::new();
        manager.add_validator("app", at_most_six).await;

        let err = manager
            .make_config(&shutdown, "app", limits(7))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::NotApplied { ref errors } if errors.len() == 1));
        assert!(!manager.is_registered(&"app").await);

        manager.make_config(&shutdown, "app", limits(6)).await.unwrap();
        assert_eq!(manager.get_config(&"app").await.unwrap().verbose.len(), 6);
    }

    #[tokio::test]
    async fn test_failed_applier_leaves_name_free() {
        let manager = manager();
        let shutdown = Shutdown::new();
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = applied.clone();

        manager
            .add_applier("app", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;
        manager
            .add_applier("app", |_, new: &mut Limits| {
                if new.verbose.is_empty() {
                    Err("verbose must not be empty".into())
                } else {
                    Ok(())
                }
            })
            .await;

        let err = manager
            .make_config(&shutdown, "app", limits(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::Apply(_)));
        assert_eq!(applied.load(Ordering::SeqCst), 1);
        assert!(manager.get_config(&"app").await.is_none());

        manager.make_config(&shutdown, "app", limits(1)).await.unwrap();
        assert_eq!(applied.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_watcher_failure_precedes_callbacks() {
        let manager = manager();
        let shutdown = Shutdown::new();
        let applied = Arc::new(AtomicUsize::new(0));
        let counter = applied.clone();

        manager
            .add_applier("app", move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await;

        crate::config::notifier::fail_next_construction();
        let config = Limits {
            file: Some(PathBuf::from("absent.yaml")),
            verbose: Vec::new(),
        };
        let err = manager
            .make_config(&shutdown, "app", config)
            .await
            .unwrap_err();

        assert!(matches!(err, ManagerError::Watch(_)));
        assert_eq!(applied.load(Ordering::SeqCst), 0);
        assert!(!manager.is_registered(&"app").await);
    }

    #[tokio::test]
    async fn test_initial_chains_see_no_current() {
        let manager = manager();
        let shutdown = Shutdown::new();
        let saw_current = Arc::new(AtomicUsize::new(0));
        let flag = saw_current.clone();

        manager
            .add_validator("app", move |current, _| {
                if current.is_some() {
                    flag.fetch_add(1, Ordering::SeqCst);
                }
                Vec::new()
            })
            .await;

        manager.make_config(&shutdown, "app", limits(1)).await.unwrap();
        assert_eq!(saw_current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_applier_may_stamp_new_value() {
        let manager = manager();
        let shutdown = Shutdown::new();
        manager
            .add_applier("app", |_, new: &mut Limits| {
                new.verbose.push(false);
                Ok(())
            })
            .await;

        manager.make_config(&shutdown, "app", limits(1)).await.unwrap();
        assert_eq!(
            manager.get_config(&"app").await.unwrap().verbose,
            vec![true, false]
        );
    }

    #[tokio::test]
    async fn test_commit_reload_rejects_and_keeps_current() {
        let manager = manager();
        let shutdown = Shutdown::new();
        manager.add_validator("app", at_most_six).await;
        manager.make_config(&shutdown, "app", limits(3)).await.unwrap();

        let mut updates = manager.new_config_chan("app").await;

        assert!(!manager.commit_reload(&"app", limits(7)).await);
        assert_eq!(manager.get_config(&"app").await.unwrap().verbose.len(), 3);
        assert!(updates.try_recv().is_err());

        assert!(manager.commit_reload(&"app", limits(4)).await);
        let delivered = updates.recv().await.unwrap();
        assert_eq!(delivered.verbose.len(), 4);
        let current = manager.get_config(&"app").await.unwrap();
        assert!(Arc::ptr_eq(&delivered, &current));
    }

    #[tokio::test]
    async fn test_commit_reload_unknown_name() {
        let manager = manager();
        assert!(!manager.commit_reload(&"ghost", limits(1)).await);
    }

    #[tokio::test]
    async fn test_clones_share_registry() {
        let manager = manager();
        let other = manager.clone();
        assert!(manager.ptr_eq(&other));

        other
            .make_config(&Shutdown::new(), "app", limits(1))
            .await
            .unwrap();
        assert!(manager.is_registered(&"app").await);
    }
}
