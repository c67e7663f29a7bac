//! Error types shared by the loader, the manager and user callbacks.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type returned by validators and appliers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure while reading or decoding a configuration file.
///
/// Every variant carries the path of the file so the message is useful
/// on its own in a log line.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parsing file {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("parsing file {}: {message}", .path.display())]
    Json { path: PathBuf, message: String },

    #[error("parsing file {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The document parsed but does not fit the configuration type.
    #[error("decoding file {} into configuration: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Error returned by [`Manager::make_config`](crate::Manager::make_config).
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("the configuration `{name}` already exists")]
    AlreadyExists { name: String },

    #[error("creating file watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("new configuration not applied because {} error(s) have been found", .errors.len())]
    NotApplied { errors: Vec<BoxError> },

    #[error("applying new configuration: {0}")]
    Apply(#[source] BoxError),
}

impl ManagerError {
    /// Whether this is the duplicate registration error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, ManagerError::AlreadyExists { .. })
    }
}
