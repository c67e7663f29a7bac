//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{ArgAction, Parser};
use live_config::{Config, ConfigReceiver, Logger, Manager, ManagerBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Logger that keeps every message for later assertions. `fatal` panics.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, level: Level, args: fmt::Arguments<'_>) {
        self.records.lock().unwrap().push((level, args.to_string()));
    }

    pub fn contains(&self, level: Level, needle: &str) -> bool {
        self.records
            .lock()
            .unwrap()
            .iter()
            .any(|(l, message)| *l == level && message.contains(needle))
    }
}

impl Logger for RecordingLogger {
    fn trace(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Trace, args);
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Debug, args);
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Info, args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Warn, args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        self.record(Level::Error, args);
    }

    fn fatal(&self, args: fmt::Arguments<'_>) -> ! {
        panic!("fatal: {args}");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    pub file: Option<PathBuf>,
    pub verbose: Vec<bool>,
    pub name: String,
}

#[derive(Debug, Parser)]
pub struct TestArgs {
    #[arg(short = 'f', long = "config")]
    pub file: Option<PathBuf>,
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Config for TestConfig {
    type Args = TestArgs;

    fn config_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn apply_args(&mut self, args: TestArgs) {
        if let Some(file) = args.file {
            self.file = Some(file);
        }
        if args.verbose > 0 {
            self.verbose = vec![true; usize::from(args.verbose)];
        }
    }
}

impl TestConfig {
    pub fn backed_by(path: &Path) -> Self {
        Self {
            file: Some(path.to_path_buf()),
            ..Self::default()
        }
    }
}

pub type TestManager = Manager<&'static str, TestConfig>;

/// Manager with no command line arguments and cluster mode off.
pub fn manager(logger: Arc<RecordingLogger>) -> TestManager {
    ManagerBuilder::new()
        .logger(logger)
        .args(["test"])
        .cluster_mode(false)
        .build()
}

pub fn verbose_yaml(entries: usize) -> String {
    format!("verbose: [{}]\n", vec!["true"; entries].join(", "))
}

/// Overwrite `path` with a single write and no truncation, so the watcher
/// sees exactly one modification and never an empty file. Shorter content
/// is padded with spaces to the current length.
pub fn write_in_place(path: &Path, content: &str) {
    let current = std::fs::metadata(path).unwrap().len() as usize;
    let mut buf = content.as_bytes().to_vec();
    if buf.len() < current {
        buf.resize(current, b' ');
    }

    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.write_all(&buf).unwrap();
}

/// Next broadcast value, or `None` after `timeout`.
pub async fn next_config(
    rx: &mut ConfigReceiver<TestConfig>,
    timeout: Duration,
) -> Option<Arc<TestConfig>> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}

/// First broadcast value satisfying `pred`, skipping the others.
pub async fn config_matching<F>(
    rx: &mut ConfigReceiver<TestConfig>,
    timeout: Duration,
    pred: F,
) -> Option<Arc<TestConfig>>
where
    F: Fn(&TestConfig) -> bool,
{
    tokio::time::timeout(timeout, async {
        while let Some(config) = rx.recv().await {
            if pred(&config) {
                return Some(config);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Poll `cond` until it holds or `timeout` elapses.
pub async fn eventually<F>(timeout: Duration, cond: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
