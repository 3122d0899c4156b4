//! Uninstall command

use anyhow::{Result, bail};
use pour_core::Reporter;
use pour_schema::PackageSpec;

use crate::ops::Context;
use crate::ops::remove::{Removed, uninstall as uninstall_version, uninstall_all};
use crate::ui::Output;

/// Remove each spec in turn: `name@version` removes one version, a bare
/// name removes all of them.
pub async fn uninstall(
    ctx: &Context,
    output: &Output,
    packages: &[String],
    dry_run: bool,
) -> Result<()> {
    let mut failures = 0usize;
    for raw in packages {
        let spec = match PackageSpec::parse(raw) {
            Ok(spec) => spec,
            Err(e) => {
                output.error(&e.to_string());
                failures += 1;
                continue;
            }
        };

        let result = match &spec.version {
            Some(version) => uninstall_version(ctx, &spec.name, version, dry_run)
                .await
                .map(|r| vec![r]),
            None => uninstall_all(ctx, &spec.name, dry_run).await,
        };

        match result {
            Ok(removed) if !dry_run => report(output, &removed),
            Ok(_) => {}
            Err(e) => {
                output.error(&e.to_string());
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{failures} package(s) could not be removed");
    }
    Ok(())
}

fn report(output: &Output, removed: &[Removed]) {
    for r in removed {
        output.done(&r.package.name, &r.package.version, "removed", None);
        if let Some(v) = &r.reactivated {
            output.info(&format!("{} {v} is now active", r.package.name));
        }
    }
}
