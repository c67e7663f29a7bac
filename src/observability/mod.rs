//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! manager.rs / watcher.rs / loader.rs
//!     → Logger trait (six levels, fatal terminates)
//!     → TracingLogger → tracing macros
//!     → tracing-subscriber (EnvFilter behind a reload layer, fmt output)
//! ```
//!
//! # Design Decisions
//! - The core only depends on the `Logger` trait so embedding applications
//!   can route messages anywhere
//! - Log level can change at runtime through `LogLevelHandle`

pub mod logging;
