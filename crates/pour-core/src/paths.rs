use dirs::home_dir;
use std::path::{Path, PathBuf};

use pour_schema::{PackageName, Version};

/// Returns the pour home directory, or None if the user's home cannot be resolved.
pub fn try_pour_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("POUR_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".pour"))
}

/// Directory layout under a pour home.
///
/// ```text
/// ~/.pour/
/// ├── bin/                  # launchers for active versions
/// ├── cellar/<name>/<ver>/  # versioned prefixes
/// ├── cache/                # downloaded archives, keyed by digest
/// ├── tmp/                  # staging (same volume as cellar)
/// ├── formula/              # <name>.toml manifests
/// ├── var/state.db          # registry
/// └── var/locks/            # per-package locks
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Build a layout rooted at `root`, made absolute against the current
    /// directory so launcher scripts never embed relative paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined for a
    /// relative `root`.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            root: std::path::absolute(root.as_ref())?,
        })
    }

    /// Layout at `$POUR_HOME` or `~/.pour`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if neither `POUR_HOME` is set nor the user's home
    /// directory can be resolved.
    pub fn from_env() -> std::io::Result<Self> {
        let root = try_pour_home().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine home directory. Set POUR_HOME to override.",
            )
        })?;
        Self::new(root)
    }

    /// Root of the layout.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared launcher directory: ~/.pour/bin
    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    /// Prefix root: ~/.pour/cellar
    pub fn cellar(&self) -> PathBuf {
        self.root.join("cellar")
    }

    /// All versions of one package: ~/.pour/cellar/<name>
    pub fn package_dir(&self, name: &PackageName) -> PathBuf {
        self.cellar().join(name)
    }

    /// Versioned prefix: ~/.pour/cellar/<name>/<version>
    pub fn prefix(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.package_dir(name).join(version)
    }

    /// Download cache: ~/.pour/cache
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }

    /// Temp path: ~/.pour/tmp (guaranteed same volume as the cellar)
    pub fn tmp_dir(&self) -> PathBuf {
        self.root.join("tmp")
    }

    /// Formula directory for bare-name installs: ~/.pour/formula
    pub fn formula_dir(&self) -> PathBuf {
        self.root.join("formula")
    }

    /// Registry database: ~/.pour/var/state.db
    pub fn db_path(&self) -> PathBuf {
        self.root.join("var").join("state.db")
    }

    /// Lock files: ~/.pour/var/locks
    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("var").join("locks")
    }

    /// Optional settings file: ~/.pour/config.toml
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Where an archive with this digest and file name is cached.
    pub fn cached_archive(&self, digest: &pour_schema::Sha256Digest, file_name: &str) -> PathBuf {
        self.cache_dir().join(format!("{digest}-{file_name}"))
    }
}
