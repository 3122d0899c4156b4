use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};

/// A validated SHA256 digest (64 lowercase hex characters).
///
/// Formulas declare their archive checksum with this type, so an invalid hex
/// string is rejected when the manifest is parsed rather than at verify time.
/// Two digests are equal exactly when the 32 bytes they encode are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Create a new `Sha256Digest`, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the hex portion is not exactly 64 ASCII hex characters.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into();
        let hex = s.strip_prefix("sha256:").unwrap_or(&s);

        if hex.len() != 64 {
            anyhow::bail!(
                "Invalid SHA256 digest: expected 64 hex characters, got {} in '{s}'",
                hex.len(),
            );
        }

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid SHA256 digest: contains non-hex characters in '{s}'");
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Build a digest from raw hasher output.
    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        Self(hex::encode(bytes))
    }

    /// Get the digest as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines (first 12 hex chars).
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl std::fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Sha256Digest {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POMODORO: &str = "c07c2c84acaa752e36e180e6534f2cd9cfb30bd6298009ef6156a04adc19845b";

    #[test]
    fn accepts_prefixed_and_uppercase() {
        let plain = Sha256Digest::new(POMODORO).unwrap();
        let prefixed = Sha256Digest::new(format!("sha256:{}", POMODORO.to_uppercase())).unwrap();
        assert_eq!(plain, prefixed);
        assert_eq!(prefixed.as_str(), POMODORO);
    }

    #[test]
    fn rejects_wrong_length_and_non_hex() {
        assert!(Sha256Digest::new("abc").is_err());
        let bad = format!("{}zz", &POMODORO[..62]);
        assert!(Sha256Digest::new(bad).is_err());
    }

    #[test]
    fn from_bytes_matches_parsed_form() {
        let bytes = hex::decode(POMODORO).unwrap();
        assert_eq!(
            Sha256Digest::from_bytes(&bytes),
            Sha256Digest::new(POMODORO).unwrap()
        );
    }

    #[test]
    fn single_bit_difference_is_unequal() {
        let mut bytes = hex::decode(POMODORO).unwrap();
        bytes[31] ^= 0x01;
        assert_ne!(
            Sha256Digest::from_bytes(&bytes),
            Sha256Digest::new(POMODORO).unwrap()
        );
    }
}
