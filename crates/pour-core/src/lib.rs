//! Core library for pour: home layout, settings, downloads, digest checks,
//! archive extraction, launcher scripts and per-package locks.
//!
//! Nothing here touches the registry database; that lives in the CLI crate.

pub mod config;
pub mod io;
pub mod lock;
pub mod paths;
pub mod reporter;
pub mod wrapper;

pub use config::Settings;
pub use paths::Layout;
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("pour-core/", env!("CARGO_PKG_VERSION"));
