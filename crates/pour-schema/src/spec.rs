//! `name@version` arguments as typed on the command line.

use crate::types::{PackageName, Version};

/// A package reference with an optional version (`pomodoromac` or `pomodoromac@0.1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// The referenced package.
    pub name: PackageName,
    /// The requested version, if one was given.
    pub version: Option<Version>,
}

impl PackageSpec {
    /// Parse a `name[@version]` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty or malformed, or if an `@` is
    /// present with nothing after it.
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let (name, version) = match input.split_once('@') {
            Some((name, version)) => {
                if version.is_empty() {
                    anyhow::bail!("Missing version after '@' in '{input}'");
                }
                (name, Some(Version::from(version)))
            }
            None => (input, None),
        };

        let name = PackageName::new(name);
        if !name.is_well_formed() {
            anyhow::bail!("Invalid package name in '{input}'");
        }
        if let Some(v) = &version {
            if !v.is_well_formed() {
                anyhow::bail!("Invalid version in '{input}'");
            }
        }

        Ok(Self { name, version })
    }
}

impl std::fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{v}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_and_version() {
        let spec = PackageSpec::parse("PomodoroMac@0.1").unwrap();
        assert_eq!(spec.name.as_str(), "pomodoromac");
        assert_eq!(spec.version.unwrap().as_str(), "0.1");
    }

    #[test]
    fn bare_name_has_no_version() {
        let spec = PackageSpec::parse("pomodoromac").unwrap();
        assert!(spec.version.is_none());
        assert_eq!(spec.to_string(), "pomodoromac");
    }

    #[test]
    fn rejects_dangling_at() {
        assert!(PackageSpec::parse("pomodoromac@").is_err());
        assert!(PackageSpec::parse("@0.1").is_err());
    }
}
