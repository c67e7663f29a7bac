//! Structured logging.
//!
//! # Responsibilities
//! - Define the leveled [`Logger`] the manager and watch loops report through
//! - Forward it to `tracing` by default
//! - Initialize the subscriber with a runtime-adjustable level
//!
//! # Design Decisions
//! - `fatal` never returns: it is the only way setup failures in a
//!   background task terminate the process
//! - The filter sits behind a `reload` layer so an applier can change
//!   verbosity without restarting

use std::fmt;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Leveled logger consumed by the manager.
///
/// Implement it to route messages into an existing logging setup; messages
/// arrive preformatted as [`fmt::Arguments`].
pub trait Logger: Send + Sync {
    fn trace(&self, args: fmt::Arguments<'_>);
    fn debug(&self, args: fmt::Arguments<'_>);
    fn info(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
    /// Log and terminate the process.
    fn fatal(&self, args: fmt::Arguments<'_>) -> !;
}

/// [`Logger`] backed by the `tracing` macros. `fatal` exits with status 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn trace(&self, args: fmt::Arguments<'_>) {
        tracing::trace!("{args}");
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!("{args}");
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!("{args}");
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!("{args}");
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        tracing::error!("{args}");
    }

    fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        tracing::error!(fatal = true, "{args}");
        std::process::exit(1)
    }
}

/// Handle to change the global log level after [`init`].
#[derive(Clone)]
pub struct LogLevelHandle {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// Replace the active filter with a single global level.
    pub fn set_level(&self, level: LevelFilter) -> Result<(), reload::Error> {
        self.handle
            .reload(EnvFilter::default().add_directive(level.into()))
    }

    /// Replace the active filter with an `EnvFilter` directive string.
    pub fn set_directives(&self, directives: &str) -> Result<(), reload::Error> {
        self.handle.reload(EnvFilter::new(directives))
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `default_directives`.
pub fn init(default_directives: &str) -> LogLevelHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    LogLevelHandle { handle }
}
