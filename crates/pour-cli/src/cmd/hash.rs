//! Hash command (formula authoring helper)

use std::path::PathBuf;

use anyhow::{Context, Result};
use pour_core::io::verify::sha256_file;

/// Print `<sha256>  <path>` for each file.
pub fn hash(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let digest =
            sha256_file(path).with_context(|| format!("Failed to hash {}", path.display()))?;
        println!("{digest}  {}", path.display());
    }
    Ok(())
}
