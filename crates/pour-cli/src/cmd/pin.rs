//! Pin and unpin commands

use anyhow::{Context as _, Result};
use pour_core::Reporter;
use pour_schema::{PackageName, PackageSpec};

use crate::ops::{Context, switch};
use crate::ui::Output;

/// Hold a package at one version.
pub async fn pin(ctx: &Context, output: &Output, raw: &str, dry_run: bool) -> Result<()> {
    let spec = PackageSpec::parse(raw)?;
    let version = spec
        .version
        .context("Version is required for pin (e.g., 'pour pin pomodoromac@0.1')")?;

    if dry_run {
        output.info(&format!("(dry run) would pin {} to {version}", spec.name));
        return Ok(());
    }

    let pkg = switch::pin(ctx, &spec.name, &version).await?;
    output.done(&pkg.name, &pkg.version, "pinned", None);
    Ok(())
}

/// Release a pin. Unpinning something that is not pinned is not an error.
pub async fn unpin(ctx: &Context, output: &Output, raw: &str, dry_run: bool) -> Result<()> {
    let name = PackageName::new(raw);
    if dry_run {
        output.info(&format!("(dry run) would unpin {name}"));
        return Ok(());
    }

    match switch::unpin(ctx, &name).await? {
        Some(version) => output.success(&format!("{name} is no longer pinned to {version}")),
        None => output.info(&format!("{name} is not pinned")),
    }
    Ok(())
}
