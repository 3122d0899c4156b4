//! Uninstall: remove a version's prefix, its launchers and its record.

use pour_core::io::fs::remove_path;
use pour_core::{Layout, Reporter};
use pour_schema::{InstalledPackage, PackageName, Version};

use crate::ops::{Context, InstallError, Stage, lock_package, open_db, switch};

/// Result of removing one version.
#[derive(Debug)]
pub struct Removed {
    /// The record that was deleted.
    pub package: InstalledPackage,
    /// Version made active in its place, if the removed one was active.
    pub reactivated: Option<Version>,
}

/// Remove one installed version.
///
/// If it was the active version, the most recently installed remaining
/// version of the same name becomes active.
pub async fn uninstall(
    ctx: &Context,
    name: &PackageName,
    version: &Version,
    dry_run: bool,
) -> Result<Removed, InstallError> {
    let _lock = lock_package(&ctx.layout, name, Stage::Uninstall).await?;

    let layout = ctx.layout.clone();
    let reporter = ctx.reporter.clone();
    let (name, version) = (name.clone(), version.clone());

    tokio::task::spawn_blocking(move || {
        uninstall_locked(&layout, &name, &version, dry_run, &*reporter)
    })
    .await
    .map_err(|e| InstallError::task(Stage::Uninstall, e))?
}

/// Remove every installed version of `name`, inactive ones first.
pub async fn uninstall_all(
    ctx: &Context,
    name: &PackageName,
    dry_run: bool,
) -> Result<Vec<Removed>, InstallError> {
    let mut versions = ctx
        .open_db(Stage::Uninstall)?
        .list_versions(name)
        .map_err(InstallError::registry(Stage::Uninstall))?;
    if versions.is_empty() {
        return Err(InstallError::NotFound {
            stage: Stage::Uninstall,
            what: name.to_string(),
        });
    }
    versions.sort_by_key(|row| row.active);

    let mut removed = Vec::with_capacity(versions.len());
    for row in versions {
        removed.push(uninstall(ctx, name, &row.version, dry_run).await?);
    }
    Ok(removed)
}

fn uninstall_locked<R: Reporter + ?Sized>(
    layout: &Layout,
    name: &PackageName,
    version: &Version,
    dry_run: bool,
    reporter: &R,
) -> Result<Removed, InstallError> {
    let reg = || InstallError::registry(Stage::Uninstall);
    let db = open_db(layout, Stage::Uninstall)?;
    let pkg = db
        .get_package(name, version)
        .map_err(reg())?
        .ok_or_else(|| InstallError::NotFound {
            stage: Stage::Uninstall,
            what: format!("{name}@{version}"),
        })?;

    if dry_run {
        reporter.info(&format!(
            "(dry run) would remove {} and {} launcher(s)",
            pkg.prefix.display(),
            pkg.wrappers.len()
        ));
        return Ok(Removed {
            package: pkg,
            reactivated: None,
        });
    }

    reporter.removing(name, version);

    // Launchers only go once the prefix is out of the cellar; either step can be undone.
    let trash = if pkg.prefix.symlink_metadata().is_ok() {
        let tmp = layout.tmp_dir();
        std::fs::create_dir_all(&tmp)
            .map_err(|e| InstallError::io(Stage::Uninstall, "cannot create tmp", e))?;
        let trash = tempfile::Builder::new()
            .prefix(&format!("{name}-{version}.remove."))
            .tempdir_in(&tmp)
            .map_err(|e| InstallError::io(Stage::Uninstall, "cannot create tmp", e))?;
        std::fs::rename(&pkg.prefix, trash.path().join("prefix")).map_err(|e| {
            InstallError::io(
                Stage::Uninstall,
                format!("cannot remove {}", pkg.prefix.display()),
                e,
            )
        })?;
        Some(trash)
    } else {
        tracing::warn!(prefix = %pkg.prefix.display(), "prefix already gone");
        reporter.warning(&format!("{} was already removed", pkg.prefix.display()));
        None
    };

    if let Err(e) = switch::unlink(layout, &pkg, reporter) {
        if let Some(trash) = &trash {
            if let Err(e) = std::fs::rename(trash.path().join("prefix"), &pkg.prefix) {
                reporter.warning(&format!("could not restore {}: {e}", pkg.prefix.display()));
            }
        }
        if pkg.active {
            if let Err(e) = switch::link(layout, &pkg) {
                reporter.warning(&format!("could not restore launchers of {name}@{version}: {e}"));
            }
        }
        return Err(InstallError::io(Stage::Uninstall, "cannot remove launchers", e));
    }

    if let Some(trash) = trash {
        if let Err(e) = remove_path(trash.path()) {
            tracing::warn!(path = %trash.path().display(), "leftover after uninstall: {e}");
        }
    }
    std::fs::remove_dir(layout.package_dir(name)).ok();

    db.remove_package(name, version).map_err(reg())?;

    let mut reactivated = None;
    if pkg.active {
        let next = db.list_versions(name).map_err(reg())?.into_iter().next();
        if let Some(next) = next {
            match switch::activate_locked(layout, &db, name, &next.version, reporter) {
                Ok(p) => reactivated = Some(p.version),
                Err(e) => reporter.warning(&format!("could not reactivate {name}@{}: {e}", next.version)),
            }
        }
    }

    db.add_history(name, "uninstall", Some(version), reactivated.as_ref(), true)
        .ok();
    tracing::info!(%name, %version, "uninstalled");

    Ok(Removed {
        package: pkg,
        reactivated,
    })
}
