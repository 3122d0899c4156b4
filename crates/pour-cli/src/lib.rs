//! pour - install a single application from a formula
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! A formula names one archive, its SHA-256 digest and a short list of
//! install actions. `pour` downloads the archive, verifies it, unpacks it
//! into a private staging directory, places the selected files into a
//! versioned prefix and writes shell launchers into `bin/`.
//!
//! # Architecture
//!
//! - **Typestate Pattern**: `FetchedArchive` → `VerifiedArchive` →
//!   `StagedSource`, so nothing is extracted before its digest matches.
//! - **Staged placement**: the prefix is assembled under `tmp/` and moved
//!   into the cellar with one rename.
//! - **Per-package locks**: operations on the same name are serialized with
//!   an advisory file lock; different names proceed concurrently.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.pour/
//! ├── bin/        # Launcher scripts for active versions
//! ├── cellar/     # Installed prefixes by name/version
//! ├── cache/      # Downloaded archives (digest-prefixed)
//! ├── tmp/        # Staging, removed after each operation
//! ├── formula/    # Formula files looked up by name
//! └── var/        # state.db and per-package locks
//! ```

pub mod cmd;
pub mod ops;
pub mod store;
pub mod ui;

pub use pour_core::USER_AGENT;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "pour")]
#[command(author, version, about = "pour - install an application from a formula")]
pub struct Cli {
    /// Installation root (defaults to ~/.pour)
    #[arg(long, global = true, env = "POUR_HOME", value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Show what would happen without making changes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install from one or more formulas
    Install {
        /// Formula name (looked up in the formula directory) or path to a .toml file
        #[arg(required = true)]
        formulas: Vec<String>,
        /// Reinstall even if the same version is already present
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// Remove an installed package
    #[command(visible_aliases = ["remove", "rm"])]
    Uninstall {
        /// Package spec: name removes every version, name@version just one
        #[arg(required = true)]
        packages: Vec<String>,
    },
    /// Switch the active version of a package
    Use {
        /// Package spec (e.g. pomodoromac@0.1)
        spec: String,
    },
    /// Hold a package at one version
    Pin {
        /// Package spec (e.g. pomodoromac@0.1)
        spec: String,
    },
    /// Release a pin
    Unpin {
        /// Package name
        package: String,
    },
    /// List installed packages
    List,
    /// Show package info
    Info {
        /// Package name
        package: String,
    },
    /// View package history
    History {
        /// Package name
        package: String,
    },
    /// Compute SHA256 hash of a file (for formula authoring)
    #[command(hide = true)]
    Hash {
        /// Files to hash
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Remove cached downloads and leftover staging directories
    Clean,
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
