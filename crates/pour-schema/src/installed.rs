use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::hash::Sha256Digest;
use crate::manifest::WrapperLink;
use crate::types::{PackageName, Version};

/// A package version that has been placed into its prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Package name.
    pub name: PackageName,
    /// Installed version.
    pub version: Version,
    /// Absolute prefix directory (`cellar/<name>/<version>`).
    pub prefix: PathBuf,
    /// Digest of the archive this prefix was built from.
    pub content_hash: Sha256Digest,
    /// Every regular file and symlink under the prefix.
    pub installed_files: BTreeSet<PathBuf>,
    /// Launchers declared for this version.
    pub wrappers: Vec<WrapperLink>,
    /// Whether this version's launchers are live in `bin/`.
    pub active: bool,
    /// Total size of the prefix in bytes.
    pub size_bytes: u64,
}
