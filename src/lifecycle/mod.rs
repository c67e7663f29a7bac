//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     make_config → initial load → validate → apply → spawn watch loop
//!     → watch loop registers paths → readiness reported → make_config returns
//!
//! Shutdown (shutdown.rs):
//!     Shutdown::trigger → every ShutdownSignal resolves
//!     → watch loops exit and drop their notifier
//! ```
//!
//! # Design Decisions
//! - Cancellation is the only way to stop a watch loop
//! - Late subscribers still observe an earlier trigger

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal};
