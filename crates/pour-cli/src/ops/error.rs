//! Domain-specific errors for package operations

use std::fmt;

use pour_core::io::download::DownloadError;
use pour_core::io::extract::ExtractError;
use pour_core::io::verify::VerifyError;
use pour_schema::{ManifestError, PackageName, Sha256Digest, Version};
use thiserror::Error;

use crate::store::DbError;

/// Pipeline stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Verify,
    Extract,
    Install,
    Uninstall,
    Activate,
    /// Read-only registry lookups (`list`, `info`, `history`).
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fetch => "fetch",
            Self::Verify => "verify",
            Self::Extract => "extract",
            Self::Install => "install",
            Self::Uninstall => "uninstall",
            Self::Activate => "activate",
            Self::Query => "query",
        })
    }
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("fetch failed: {0}")]
    Network(#[source] DownloadError),

    #[error("verify failed: checksum mismatch (expected {expected}, got {actual})")]
    Integrity {
        expected: Sha256Digest,
        actual: Sha256Digest,
    },

    #[error("extract failed: {0}")]
    Format(#[source] ExtractError),

    #[error("{stage} failed: {context}: {source}")]
    Io {
        stage: Stage,
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} failed: {what} is not installed")]
    NotFound { stage: Stage, what: String },

    #[error("activate failed: {name} is pinned to {version}; run `pour unpin {name}` first")]
    Pinned { name: PackageName, version: Version },

    #[error("install failed: invalid formula: {0}")]
    Manifest(#[from] ManifestError),

    #[error("{stage} failed: registry error: {source}")]
    Registry {
        stage: Stage,
        #[source]
        source: DbError,
    },
}

impl InstallError {
    /// An IO failure during `stage`.
    pub fn io(stage: Stage, context: impl fmt::Display, source: std::io::Error) -> Self {
        Self::Io {
            stage,
            context: context.to_string(),
            source,
        }
    }

    /// Shorthand for a registry failure during `stage`.
    pub fn registry(stage: Stage) -> impl FnOnce(DbError) -> Self {
        move |source| Self::Registry { stage, source }
    }

    /// A blocking task that panicked or was cancelled.
    pub fn task(stage: Stage, err: tokio::task::JoinError) -> Self {
        Self::io(stage, "background task failed", std::io::Error::other(err))
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Network(_) => Stage::Fetch,
            Self::Integrity { .. } => Stage::Verify,
            Self::Format(_) => Stage::Extract,
            Self::Pinned { .. } => Stage::Activate,
            Self::Manifest(_) => Stage::Install,
            Self::Io { stage, .. } | Self::NotFound { stage, .. } | Self::Registry { stage, .. } => {
                *stage
            }
        }
    }
}

impl From<DownloadError> for InstallError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Io { path, source } => Self::Io {
                stage: Stage::Fetch,
                context: format!("cannot write {}", path.display()),
                source,
            },
            other => Self::Network(other),
        }
    }
}

impl From<VerifyError> for InstallError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::HashMismatch { expected, actual } => Self::Integrity { expected, actual },
            VerifyError::Io(source) => Self::io(Stage::Verify, "cannot read archive", source),
        }
    }
}

impl From<ExtractError> for InstallError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Io(source) => Self::io(Stage::Extract, "cannot write staging", source),
            other => Self::Format(other),
        }
    }
}
