//! Data model shared by the pour crates: formula manifests, install actions,
//! and the record of an installed package version.

/// SHA256 digest type.
pub mod hash;
/// Records of installed package versions.
pub mod installed;
pub mod manifest;
pub mod spec;
/// Shared primitive types.
pub mod types;

// Re-exports
pub use hash::Sha256Digest;
pub use installed::InstalledPackage;
pub use manifest::{Action, Manifest, ManifestError, WrapperLink};
pub use spec::PackageSpec;
pub use types::*;

/// Magic bytes for ZSTD compression (Little Endian: 0xFD2FB528 -> 28 B5 2F FD)
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
