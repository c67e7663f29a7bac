//! Live configuration demo.
//!
//! Serves its own configuration as JSON and reloads it whenever the backing
//! file changes. The number of `verbose` entries drives the log level.
//!
//! ```text
//!   config.yaml ──▶ Manager ──▶ validate ──▶ apply (log level, reload count)
//!                     │
//!                     └──▶ subscriber task ──▶ shared copy ──▶ GET /
//! ```
//!
//! Run with `live-config-demo -f demo/config.yaml`, then edit the file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use clap::{ArgAction, Parser};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;

use live_config::observability::logging::{self, LogLevelHandle};
use live_config::{BoxError, Config, Manager, ManagerBuilder, Shutdown, TracingLogger};

const APP: &str = "app";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct DemoConfig {
    version: bool,
    file: Option<PathBuf>,
    verbose: Vec<bool>,
    port: u16,
    /// Set by the applier, never read from the file.
    #[serde(skip)]
    reloads: u32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            version: false,
            file: Some(PathBuf::from("./config.yaml")),
            verbose: Vec::new(),
            port: 8080,
            reloads: 0,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "live-config-demo", about = "Serve a hot reloaded configuration")]
struct DemoArgs {
    /// Print the version and exit
    #[arg(long)]
    version: bool,

    /// Configuration file (yaml, json or toml)
    #[arg(short = 'f', long = "config")]
    file: Option<PathBuf>,

    /// Verbosity, repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// HTTP port, fixed after startup
    #[arg(short, long)]
    port: Option<u16>,
}

impl Config for DemoConfig {
    type Args = DemoArgs;

    fn config_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn apply_args(&mut self, args: DemoArgs) {
        self.version |= args.version;
        if let Some(file) = args.file {
            self.file = Some(file);
        }
        if args.verbose > 0 {
            self.verbose = vec![true; usize::from(args.verbose)];
        }
        if let Some(port) = args.port {
            self.port = port;
        }
    }
}

type SharedConfig = Arc<RwLock<Arc<DemoConfig>>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let log_level = logging::init("live_config=debug,live_config_demo=debug,tower_http=debug");

    let manager: Manager<&'static str, DemoConfig> = ManagerBuilder::new()
        .logger(Arc::new(TracingLogger))
        .build();
    let shutdown = Arc::new(Shutdown::new());

    manager.add_validator(APP, validate).await;
    manager
        .add_applier(APP, move |current, new: &mut DemoConfig| {
            apply(&log_level, current, new)
        })
        .await;

    manager
        .make_config(&shutdown, APP, DemoConfig::default())
        .await?;

    let Some(config) = manager.get_config(&APP).await else {
        return Err("configuration `app` is not registered".into());
    };

    if config.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let port = config.port;
    let current: SharedConfig = Arc::new(RwLock::new(config));

    let mut updates = manager.new_config_chan(APP).await;
    let latest = Arc::clone(&current);
    tokio::spawn(async move {
        while let Some(config) = updates.recv().await {
            tracing::info!(reloads = config.reloads, "configuration updated");
            *latest.write().await = config;
        }
    });

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(address = %listener.local_addr()?, "listening");

    let app = Router::new()
        .route("/", get(show_config))
        .with_state(current)
        .layer(TraceLayer::new_for_http());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&shutdown)))
        .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn show_config(State(config): State<SharedConfig>) -> Json<DemoConfig> {
    Json(DemoConfig::clone(&**config.read().await))
}

fn validate(current: Option<&DemoConfig>, new: &DemoConfig) -> Vec<BoxError> {
    let mut errors: Vec<BoxError> = Vec::new();

    match current {
        None if new.port == 0 => {
            errors.push(format!("port `{}` is not valid", new.port).into());
        }
        Some(current) if current.port != new.port => {
            errors.push(
                format!("port `{}` can not be changed to `{}`", current.port, new.port).into(),
            );
        }
        _ => {}
    }

    if new.verbose.len() > 6 {
        errors.push(
            format!("verbose `{}` can not be greater than 6", new.verbose.len()).into(),
        );
    }

    errors
}

fn apply(
    log_level: &LogLevelHandle,
    current: Option<&DemoConfig>,
    new: &mut DemoConfig,
) -> Result<(), BoxError> {
    log_level.set_level(level_for(new.verbose.len()))?;

    if let Some(current) = current {
        new.reloads = current.reloads + 1;
        tracing::debug!(reloads = new.reloads, "incrementing reload count");
    }

    Ok(())
}

/// Log level for a number of `verbose` entries. Zero means no explicit
/// choice and, like anything above five, logs everything.
fn level_for(verbose: usize) -> LevelFilter {
    match verbose {
        1 | 2 => LevelFilter::ERROR,
        3 => LevelFilter::WARN,
        4 => LevelFilter::INFO,
        5 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

async fn shutdown_signal(shutdown: Arc<Shutdown>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
    shutdown.trigger();
}
