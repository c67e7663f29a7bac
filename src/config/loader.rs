//! Configuration loading: command line overlay first, then the backing file.

use std::ffi::OsString;
use std::fs;
use std::sync::Arc;

use clap::{error::ErrorKind, Parser};

use crate::config::{format::decode_onto, watched_file, Config};
use crate::error::LoadError;
use crate::observability::logging::Logger;

/// Loads configurations from process arguments and files.
///
/// `--help` and `--version` print and exit the process with status 0; any
/// other argument error is logged at fatal level, which terminates the process.
#[derive(Clone)]
pub struct Loader {
    args: Vec<OsString>,
    logger: Arc<dyn Logger>,
}

impl Loader {
    /// Create a loader parsing `args` (program name first).
    pub fn new(args: Vec<OsString>, logger: Arc<dyn Logger>) -> Self {
        Self { args, logger }
    }

    /// Create a loader over the arguments of the current process.
    pub fn from_env(logger: Arc<dyn Logger>) -> Self {
        Self::new(std::env::args_os().collect(), logger)
    }

    /// Overlay CLI values, then the content of the backing file, onto `target`.
    pub fn load<C: Config>(&self, target: &mut C) -> Result<(), LoadError> {
        self.read_cli_options(target);

        if let Err(e) = self.read_config_file(target) {
            self.logger.error(format_args!(
                "configuration not applied because parsing of config file failed: {e}"
            ));
            return Err(e);
        }

        Ok(())
    }

    fn read_cli_options<C: Config>(&self, target: &mut C) {
        match C::Args::try_parse_from(&self.args) {
            Ok(args) => target.apply_args(args),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                self.print_message(&e);
                std::process::exit(0);
            }
            Err(e) => self.logger.fatal(format_args!("{e}")),
        }
    }

    /// Print a help or version message, warning if stdout is unusable.
    fn print_message(&self, message: &clap::Error) -> bool {
        match message.print() {
            Ok(()) => true,
            Err(e) => {
                self.logger
                    .warn(format_args!("printing command line message failed: {e}"));
                false
            }
        }
    }

    fn read_config_file<C: Config>(&self, target: &mut C) -> Result<(), LoadError> {
        let Some(path) = watched_file(target).map(|p| p.to_path_buf()) else {
            return Ok(());
        };

        let content = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;

        decode_onto(target, &path, &content)
    }
}
