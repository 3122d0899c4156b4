//! Use command: switch the active version of a package

use anyhow::{Context as _, Result};
use pour_core::Reporter;
use pour_schema::PackageSpec;

use crate::ops::{Context, switch};
use crate::ui::Output;

/// Switch the active version of a package (CLI Entry Point)
pub async fn use_package(ctx: &Context, output: &Output, raw: &str, dry_run: bool) -> Result<()> {
    let spec = PackageSpec::parse(raw)?;
    let version = spec
        .version
        .context("Version is required for use (e.g., 'pour use pomodoromac@0.1')")?;

    if dry_run {
        output.info(&format!("(dry run) would activate {} {version}", spec.name));
        return Ok(());
    }

    let pkg = switch::activate(ctx, &spec.name, &version).await?;
    output.done(&pkg.name, &pkg.version, "active", None);
    Ok(())
}
