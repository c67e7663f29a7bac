//! Manager settings and builder.

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{Config, Loader};
use crate::manager::{ConfigName, Manager};
use crate::observability::logging::{Logger, TracingLogger};

/// Environment variable whose presence marks a Kubernetes pod.
pub const CLUSTER_ENV: &str = "KUBERNETES_PORT";

/// Tunables for a [`Manager`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagerOptions {
    /// Slots per subscriber channel. Broadcasts wait for a free slot while
    /// holding the registry lock, so a subscriber that stops receiving stalls
    /// every reload once its slots are full. Values below 1 are raised to 1.
    pub subscriber_capacity: usize,

    /// How long `make_config` waits for the watch task to confirm the file
    /// is being observed.
    pub ready_timeout_ms: u64,

    /// Force the parent directory watch on or off. `None` detects it from
    /// [`CLUSTER_ENV`].
    pub cluster_mode: Option<bool>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            subscriber_capacity: 1,
            ready_timeout_ms: 5_000,
            cluster_mode: None,
        }
    }
}

impl ManagerOptions {
    pub(crate) fn channel_capacity(&self) -> usize {
        self.subscriber_capacity.max(1)
    }

    pub(crate) fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub(crate) fn in_cluster(&self) -> bool {
        self.cluster_mode.unwrap_or_else(|| {
            std::env::var_os(CLUSTER_ENV).is_some_and(|value| !value.is_empty())
        })
    }
}

/// Builder for an explicitly owned [`Manager`].
#[derive(Default)]
pub struct ManagerBuilder {
    logger: Option<Arc<dyn Logger>>,
    options: ManagerOptions,
    args: Option<Vec<OsString>>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Logger for the manager and its watch loops. Defaults to [`TracingLogger`].
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn options(mut self, options: ManagerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn subscriber_capacity(mut self, capacity: usize) -> Self {
        self.options.subscriber_capacity = capacity;
        self
    }

    pub fn cluster_mode(mut self, enabled: bool) -> Self {
        self.options.cluster_mode = Some(enabled);
        self
    }

    /// Argument vector used for the command line overlay, program name
    /// first. Defaults to the arguments of the current process.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn build<K: ConfigName, C: Config>(self) -> Manager<K, C> {
        let logger = self.logger.unwrap_or_else(|| Arc::new(TracingLogger));
        let loader = match self.args {
            Some(args) => Loader::new(args, Arc::clone(&logger)),
            None => Loader::from_env(Arc::clone(&logger)),
        };
        Manager::from_parts(logger, loader, self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ManagerOptions::default();
        assert_eq!(options.channel_capacity(), 1);
        assert_eq!(options.ready_timeout(), Duration::from_secs(5));
        assert!(options.cluster_mode.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let options: ManagerOptions = toml::from_str("subscriber_capacity = 16\n").unwrap();
        assert_eq!(options.channel_capacity(), 16);
        assert_eq!(options.ready_timeout_ms, 5_000);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let options = ManagerOptions {
            subscriber_capacity: 0,
            ..ManagerOptions::default()
        };
        assert_eq!(options.channel_capacity(), 1);
    }

    #[test]
    fn test_cluster_override() {
        let mut options = ManagerOptions::default();
        options.cluster_mode = Some(true);
        assert!(options.in_cluster());
        options.cluster_mode = Some(false);
        assert!(!options.in_cluster());
    }
}
