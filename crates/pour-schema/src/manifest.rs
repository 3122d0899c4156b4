//! Formula manifests.
//!
//! A manifest declares one package version: where its source archive lives,
//! the archive's SHA-256 digest, and the ordered install actions that turn the
//! extracted archive into a prefix plus launchers.
//!
//! ```toml
//! name = "pomodoromac"
//! description = "Basic pomodoro for macOS"
//! homepage = "https://github.com/0x3m1r/PomodoroMac"
//! source_url = "https://github.com/0x3m1r/PomodoroMac/pomodoro_for_mac.tar.gz"
//! content_hash = "c07c2c84acaa752e36e180e6534f2cd9cfb30bd6298009ef6156a04adc19845b"
//! version = "0.1"
//!
//! [[install]]
//! action = "copy_into_prefix"
//! path = "pomodoro_for_mac.app"
//!
//! [[install]]
//! action = "write_executable_wrapper"
//! target = "pomodoro_for_mac.app/Contents/MacOS/pomodoro_for_mac"
//! ```

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::Sha256Digest;
use crate::types::{ArtifactFormat, PackageName, Version};

/// Errors that can occur when loading or validating a manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The TOML content could not be deserialized into a manifest.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A required field is empty.
    #[error("Empty field: {0}")]
    EmptyField(&'static str),

    /// The package name cannot be used as a directory or launcher name.
    #[error("Invalid package name '{0}'")]
    InvalidName(String),

    /// The version cannot be used as a directory name.
    #[error("Invalid version '{0}'")]
    InvalidVersion(String),

    /// A URL is malformed or uses an unsupported scheme.
    #[error("Invalid URL for {field}: {url}")]
    InvalidUrl {
        /// Which field held the URL.
        field: &'static str,
        /// The offending value.
        url: String,
    },

    /// The install list is empty.
    #[error("Manifest declares no install actions")]
    NoActions,

    /// An action path is absolute or climbs out of its root.
    #[error("Unsafe path in install action: {0}")]
    UnsafePath(String),

    /// A launcher name is invalid.
    #[error("Invalid wrapper name '{0}'")]
    InvalidWrapperName(String),

    /// Two launchers would be written to the same file.
    #[error("Duplicate wrapper name '{0}'")]
    DuplicateWrapper(String),
}

/// One install step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Move a file or directory tree from the staging directory into the prefix.
    CopyIntoPrefix {
        /// Path relative to the extracted archive root.
        path: String,
    },
    /// Write a launcher into the shared `bin` directory.
    WriteExecutableWrapper {
        /// Executable path relative to the prefix.
        target: String,
        /// Launcher file name; defaults to the package name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

/// A launcher as it will exist in the shared `bin` directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WrapperLink {
    /// File name inside `bin/`.
    pub name: String,
    /// Executable path relative to the prefix.
    pub target: PathBuf,
}

/// A parsed, validated package manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Package name.
    pub name: PackageName,
    /// Short human-readable summary.
    #[serde(default)]
    pub description: String,
    /// Project homepage.
    #[serde(default)]
    pub homepage: String,
    /// Where the source archive is downloaded from.
    pub source_url: String,
    /// Expected SHA-256 digest of the source archive.
    pub content_hash: Sha256Digest,
    /// Version identifier.
    pub version: Version,
    /// Archive format override for URLs without a telling extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ArtifactFormat>,
    /// Ordered install actions.
    #[serde(default)]
    pub install: Vec<Action>,
}

impl Manifest {
    /// Read, parse and validate a manifest file.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Io`] if the file cannot be read, otherwise the
    /// errors of [`Manifest::parse`].
    pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse and validate a manifest from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Parse`] for malformed TOML (including an
    /// invalid `content_hash`) and the validation errors of [`Manifest::validate`].
    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let manifest: Self = toml::from_str(content)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Check the invariants the installer relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.name.is_empty() {
            return Err(ManifestError::EmptyField("name"));
        }
        if !self.name.is_well_formed() {
            return Err(ManifestError::InvalidName(self.name.to_string()));
        }
        if self.version.is_empty() {
            return Err(ManifestError::EmptyField("version"));
        }
        if !self.version.is_well_formed() {
            return Err(ManifestError::InvalidVersion(self.version.to_string()));
        }
        if self.source_url.is_empty() {
            return Err(ManifestError::EmptyField("source_url"));
        }
        let scheme_ok = ["http://", "https://", "file://"]
            .iter()
            .any(|s| self.source_url.starts_with(s));
        if !scheme_ok || self.archive_file_name().is_empty() {
            return Err(ManifestError::InvalidUrl {
                field: "source_url",
                url: self.source_url.clone(),
            });
        }
        if !self.homepage.is_empty()
            && !(self.homepage.starts_with("http://") || self.homepage.starts_with("https://"))
        {
            return Err(ManifestError::InvalidUrl {
                field: "homepage",
                url: self.homepage.clone(),
            });
        }
        if self.install.is_empty() {
            return Err(ManifestError::NoActions);
        }

        for action in &self.install {
            match action {
                Action::CopyIntoPrefix { path } => check_relative(path)?,
                Action::WriteExecutableWrapper { target, .. } => check_relative(target)?,
            }
        }

        let mut seen = HashSet::new();
        for link in self.wrappers() {
            if link.name.is_empty()
                || link.name == "."
                || link.name == ".."
                || link.name.contains(['/', '\\'])
            {
                return Err(ManifestError::InvalidWrapperName(link.name));
            }
            if !seen.insert(link.name.clone()) {
                return Err(ManifestError::DuplicateWrapper(link.name));
            }
        }

        Ok(())
    }

    /// Launchers this manifest declares, with default names resolved.
    pub fn wrappers(&self) -> Vec<WrapperLink> {
        self.install
            .iter()
            .filter_map(|action| match action {
                Action::WriteExecutableWrapper { target, name } => Some(WrapperLink {
                    name: name.clone().unwrap_or_else(|| self.name.to_string()),
                    target: PathBuf::from(target),
                }),
                Action::CopyIntoPrefix { .. } => None,
            })
            .collect()
    }

    /// Paths the `CopyIntoPrefix` actions take from the staging directory.
    pub fn copy_paths(&self) -> impl Iterator<Item = &str> {
        self.install.iter().filter_map(|action| match action {
            Action::CopyIntoPrefix { path } => Some(path.as_str()),
            Action::WriteExecutableWrapper { .. } => None,
        })
    }

    /// The last path segment of `source_url`, without query or fragment.
    pub fn archive_file_name(&self) -> &str {
        let without_query = self
            .source_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        without_query.split('/').next_back().unwrap_or_default()
    }
}

fn check_relative(path: &str) -> Result<(), ManifestError> {
    let p = Path::new(path);
    let safe = !path.is_empty()
        && p.components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
        && p.components().any(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(ManifestError::UnsafePath(path.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POMODORO: &str = r#"
name = "pomodoromac"
description = "Basic pomodoro for macOS"
homepage = "https://github.com/0x3m1r/PomodoroMac"
source_url = "https://github.com/0x3m1r/PomodoroMac/pomodoro_for_mac.tar.gz"
content_hash = "c07c2c84acaa752e36e180e6534f2cd9cfb30bd6298009ef6156a04adc19845b"
version = "0.1"

[[install]]
action = "copy_into_prefix"
path = "pomodoro_for_mac.app"

[[install]]
action = "write_executable_wrapper"
target = "pomodoro_for_mac.app/Contents/MacOS/pomodoro_for_mac"
"#;

    #[test]
    fn parses_pomodoro_formula() {
        let m = Manifest::parse(POMODORO).unwrap();
        assert_eq!(m.name.as_str(), "pomodoromac");
        assert_eq!(m.version.as_str(), "0.1");
        assert_eq!(m.archive_file_name(), "pomodoro_for_mac.tar.gz");
        assert_eq!(m.install.len(), 2);
        assert_eq!(
            m.install[0],
            Action::CopyIntoPrefix {
                path: "pomodoro_for_mac.app".to_string()
            }
        );

        let wrappers = m.wrappers();
        assert_eq!(wrappers.len(), 1);
        assert_eq!(wrappers[0].name, "pomodoromac");
        assert_eq!(
            wrappers[0].target,
            PathBuf::from("pomodoro_for_mac.app/Contents/MacOS/pomodoro_for_mac")
        );
    }

    #[test]
    fn bad_hash_is_a_parse_error() {
        let src = POMODORO.replace("c07c2c84", "zz");
        assert!(matches!(
            Manifest::parse(&src),
            Err(ManifestError::Parse(_))
        ));
    }

    #[test]
    fn empty_install_list_is_rejected() {
        let src = POMODORO.split("[[install]]").next().unwrap().to_string();
        assert!(matches!(
            Manifest::parse(&src),
            Err(ManifestError::NoActions)
        ));
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let src = POMODORO.replace("path = \"pomodoro_for_mac.app\"", "path = \"../../etc\"");
        assert!(matches!(
            Manifest::parse(&src),
            Err(ManifestError::UnsafePath(_))
        ));

        let src = POMODORO.replace(
            "target = \"pomodoro_for_mac.app/Contents/MacOS/pomodoro_for_mac\"",
            "target = \"/bin/sh\"",
        );
        assert!(matches!(
            Manifest::parse(&src),
            Err(ManifestError::UnsafePath(_))
        ));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let src = POMODORO.replace("https://github.com/0x3m1r/PomodoroMac/pomodoro", "ftp://x/pomodoro");
        assert!(matches!(
            Manifest::parse(&src),
            Err(ManifestError::InvalidUrl { field: "source_url", .. })
        ));
    }

    #[test]
    fn duplicate_default_wrapper_names_are_rejected() {
        let src = format!(
            "{POMODORO}\n[[install]]\naction = \"write_executable_wrapper\"\ntarget = \"other\"\n"
        );
        assert!(matches!(
            Manifest::parse(&src),
            Err(ManifestError::DuplicateWrapper(name)) if name == "pomodoromac"
        ));

        let named = format!(
            "{POMODORO}\n[[install]]\naction = \"write_executable_wrapper\"\ntarget = \"other\"\nname = \"pomo-cli\"\n"
        );
        let m = Manifest::parse(&named).unwrap();
        assert_eq!(m.wrappers().len(), 2);
    }

    #[test]
    fn archive_name_ignores_query() {
        let src = POMODORO.replace(
            "pomodoro_for_mac.tar.gz\"",
            "pomodoro_for_mac.tar.gz?raw=true\"",
        );
        let m = Manifest::parse(&src).unwrap();
        assert_eq!(m.archive_file_name(), "pomodoro_for_mac.tar.gz");
    }
}
