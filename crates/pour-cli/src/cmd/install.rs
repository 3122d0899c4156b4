//! Install command

use std::time::Instant;

use anyhow::{Result, bail};
use pour_core::Reporter;
use tokio::task::JoinSet;

use crate::ops::Context;
use crate::ops::install::{
    InstallOptions, InstallOutcome, install_package, live_launchers, perform_ux_checks,
    resolve_formula,
};
use crate::ui::Output;

/// Install every formula concurrently; one failure does not stop the rest.
pub async fn install(
    ctx: &Context,
    output: &Output,
    formulas: &[String],
    force: bool,
    dry_run: bool,
) -> Result<()> {
    let start = Instant::now();
    let opts = InstallOptions { force, dry_run };
    let mut failures = 0usize;

    let mut set = JoinSet::new();
    for arg in formulas {
        let manifest = match resolve_formula(ctx, arg) {
            Ok(m) => m,
            Err(e) => {
                output.error(&format!("{arg}: {e}"));
                failures += 1;
                continue;
            }
        };
        let ctx = ctx.clone();
        set.spawn(async move {
            let result = install_package(&ctx, &manifest, opts).await;
            (manifest, result)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(outcome))) => outcomes.push(outcome),
            Ok((manifest, Err(e))) => {
                tracing::error!(name = %manifest.name, stage = %e.stage(), "{e}");
                output.failed(&manifest.name, &manifest.version, &e.to_string());
                failures += 1;
            }
            Err(e) => {
                output.error(&format!("install task failed: {e}"));
                failures += 1;
            }
        }
    }

    let installed = outcomes
        .iter()
        .filter(|o| !matches!(o, InstallOutcome::Planned))
        .count();
    output.summary(installed, "ready", start.elapsed().as_secs_f64());

    if !dry_run {
        perform_ux_checks(&ctx.layout, &live_launchers(&outcomes), output);
    }

    if failures > 0 {
        bail!("{failures} of {} formula(s) failed", formulas.len());
    }
    Ok(())
}
