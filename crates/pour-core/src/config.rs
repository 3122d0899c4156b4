//! User settings read from `~/.pour/config.toml`.
//!
//! Every key is optional:
//!
//! ```toml
//! http_timeout_secs = 300
//! keep_downloads = true
//! formula_dir = "/Users/me/formulae"
//! user_agent = "pour/0.1.0"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::paths::Layout;

/// Errors raised while loading settings.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Whole-request timeout for downloads.
    pub http_timeout_secs: u64,
    /// Keep archives in the cache after a successful install.
    pub keep_downloads: bool,
    /// Where bare formula names are looked up; defaults to `<home>/formula`.
    pub formula_dir: Option<PathBuf>,
    /// User-Agent header sent with downloads.
    pub user_agent: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_timeout_secs: 300,
            keep_downloads: true,
            formula_dir: None,
            user_agent: crate::USER_AGENT.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the settings file belonging to `layout`.
    pub fn for_layout(layout: &Layout) -> Result<Self, ConfigError> {
        Self::load(&layout.config_path())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Effective formula directory.
    pub fn formula_dir(&self, layout: &Layout) -> PathBuf {
        self.formula_dir
            .clone()
            .unwrap_or_else(|| layout.formula_dir())
    }

    /// HTTP client configured from these settings.
    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.http_timeout())
            .build()
    }
}
