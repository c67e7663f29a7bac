//! State guarded by the manager lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{Applier, Validator};
use crate::manager::ConfigName;
use crate::observability::logging::Logger;

/// Per-name current values, subscriber channels and callback chains.
pub(crate) struct Registry<K, C> {
    pub(crate) configs: HashMap<K, Arc<C>>,
    pub(crate) subscribers: HashMap<K, Vec<mpsc::Sender<Arc<C>>>>,
    pub(crate) validators: HashMap<K, Vec<Validator<C>>>,
    pub(crate) appliers: HashMap<K, Vec<Applier<C>>>,
}

impl<K: Eq + Hash, C> Default for Registry<K, C> {
    fn default() -> Self {
        Self {
            configs: HashMap::new(),
            subscribers: HashMap::new(),
            validators: HashMap::new(),
            appliers: HashMap::new(),
        }
    }
}

impl<K: ConfigName, C: Send + Sync + 'static> Registry<K, C> {
    pub(crate) fn validators_for(&self, name: &K) -> &[Validator<C>] {
        self.validators
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn appliers_for(&self, name: &K) -> &[Applier<C>] {
        self.appliers.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Send `config` to every subscriber of `name`, one at a time.
    ///
    /// Each send waits for channel capacity. Subscribers whose receiver was
    /// dropped are removed.
    pub(crate) async fn broadcast(&mut self, name: &K, config: &Arc<C>, logger: &dyn Logger) {
        let Some(senders) = self.subscribers.get_mut(name) else {
            return;
        };

        let pending = std::mem::take(senders);
        let total = pending.len();
        let mut open = Vec::with_capacity(total);

        for sender in pending {
            logger.trace(format_args!(
                "signaling new conf {:p} for `{name:?}`",
                Arc::as_ptr(config)
            ));
            if sender.send(Arc::clone(config)).await.is_ok() {
                open.push(sender);
            }
        }

        if open.len() < total {
            logger.debug(format_args!(
                "dropped {} closed subscriber(s) of `{name:?}`",
                total - open.len()
            ));
        }

        *senders = open;
    }
}
