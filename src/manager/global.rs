//! Process-wide managers.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::config::Config;
use crate::manager::{ConfigName, Manager};
use crate::observability::logging::Logger;

type Managers = Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>;

static MANAGERS: OnceLock<Managers> = OnceLock::new();

impl<K: ConfigName, C: Config> Manager<K, C> {
    /// The process-wide manager for this `(K, C)` pair.
    ///
    /// The first call creates it with `logger` and the process arguments;
    /// later calls return the same instance and ignore `logger`.
    pub fn get_or_create(logger: Arc<dyn Logger>) -> Self {
        let mut managers = MANAGERS
            .get_or_init(Managers::default)
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let key = TypeId::of::<Self>();
        if let Some(existing) = managers.get(&key).and_then(|m| m.downcast_ref::<Self>()) {
            return existing.clone();
        }

        let manager = Self::new(logger);
        managers.insert(key, Box::new(manager.clone()));
        manager
    }
}
