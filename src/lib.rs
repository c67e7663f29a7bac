//! Live configuration manager.
//!
//! Loads a typed configuration from the command line and an optional file,
//! validates and applies it, then watches the file and publishes every
//! accepted change to subscribers.
//!
//! ```text
//!   Manager::make_config ──▶ Loader (clap, then yaml/json/toml file)
//!          │                    │
//!          │                    ▼
//!          │            validators ──▶ appliers ──▶ Arc<C> committed
//!          ▼
//!   watch loop (one task per name)
//!     notify events ──▶ reload ──▶ validate ──▶ apply ──▶ commit ──▶ broadcast
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod observability;

pub use config::validation::{applier, validator};
pub use config::{Applier, Config, Format, Loader, NoArgs, Validator};
pub use error::{BoxError, LoadError, ManagerError};
pub use lifecycle::{Shutdown, ShutdownSignal};
pub use manager::{ConfigName, ConfigReceiver, Manager, ManagerBuilder, ManagerOptions};
pub use observability::logging::{Logger, TracingLogger};
