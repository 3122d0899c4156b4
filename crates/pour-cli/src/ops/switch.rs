//! Activation: which installed version the launchers in `bin/` point at.

use std::io;
use std::path::PathBuf;

use pour_core::wrapper::{self, StagedWrapper};
use pour_core::{Layout, Reporter};
use pour_schema::{InstalledPackage, PackageName, Version, WrapperLink};

use crate::ops::{Context, InstallError, Stage, lock_package, open_db};
use crate::store::StateDb;

/// Stage a launcher in `bin/` for every wrapper of `pkg` without committing.
pub(crate) fn stage_wrappers(
    layout: &Layout,
    pkg: &InstalledPackage,
) -> io::Result<Vec<StagedWrapper>> {
    let bin = layout.bin_dir();
    pkg.wrappers
        .iter()
        .map(|w| {
            let script = wrapper::render(&pkg.name, &pkg.version, &pkg.prefix.join(&w.target));
            StagedWrapper::stage(&bin, &w.name, &script)
        })
        .collect()
}

/// Commit staged launchers. On failure the ones already committed are removed.
pub(crate) fn commit_wrappers(staged: Vec<StagedWrapper>) -> io::Result<Vec<PathBuf>> {
    let mut committed = Vec::with_capacity(staged.len());
    for s in staged {
        match s.commit() {
            Ok(path) => committed.push(path),
            Err(e) => {
                for path in &committed {
                    std::fs::remove_file(path).ok();
                }
                return Err(e);
            }
        }
    }
    Ok(committed)
}

/// Write every launcher of `pkg`. Nothing is committed unless all stage cleanly.
pub(crate) fn link(layout: &Layout, pkg: &InstalledPackage) -> io::Result<Vec<PathBuf>> {
    commit_wrappers(stage_wrappers(layout, pkg)?)
}

/// Remove the launchers of `pkg` that still point into its prefix.
///
/// A launcher that is already gone is reported and skipped; one that now
/// belongs to something else is left alone.
pub(crate) fn unlink<R: Reporter + ?Sized>(
    layout: &Layout,
    pkg: &InstalledPackage,
    reporter: &R,
) -> io::Result<()> {
    let bin = layout.bin_dir();
    for w in &pkg.wrappers {
        let path = bin.join(&w.name);
        if path.symlink_metadata().is_err() {
            tracing::warn!(link = %path.display(), "launcher already removed");
            reporter.warning(&format!("{} was already removed", path.display()));
            continue;
        }
        if wrapper::points_into(&path, &pkg.prefix) {
            std::fs::remove_file(&path)?;
            tracing::debug!(link = %path.display(), "launcher removed");
        } else {
            tracing::warn!(link = %path.display(), "launcher no longer points at {}", pkg.prefix.display());
        }
    }
    Ok(())
}

/// Fail if writing `wrappers` for `name` would replace a file pour did not
/// write, or a launcher recorded for another package.
pub(crate) fn check_conflicts(
    layout: &Layout,
    db: &StateDb,
    name: &PackageName,
    wrappers: &[WrapperLink],
    stage: Stage,
) -> Result<(), InstallError> {
    let conflict = |context: String| {
        InstallError::io(stage, context, io::Error::from(io::ErrorKind::AlreadyExists))
    };
    let bin = layout.bin_dir();
    for w in wrappers {
        if let Some(owner) = db
            .wrapper_owner(&w.name, name)
            .map_err(InstallError::registry(stage))?
        {
            return Err(conflict(format!("launcher {} belongs to {owner}", w.name)));
        }
        let existing = bin.join(&w.name);
        if existing.symlink_metadata().is_ok() && wrapper::read_target(&existing).is_none() {
            return Err(conflict(format!(
                "{} exists and was not written by pour",
                existing.display()
            )));
        }
    }
    Ok(())
}

/// Make `version` the active version of `name`. Caller holds the package lock.
pub(crate) fn activate_locked<R: Reporter + ?Sized>(
    layout: &Layout,
    db: &StateDb,
    name: &PackageName,
    version: &Version,
    reporter: &R,
) -> Result<InstalledPackage, InstallError> {
    let reg = || InstallError::registry(Stage::Activate);
    let pkg = db
        .get_package(name, version)
        .map_err(reg())?
        .ok_or_else(|| InstallError::NotFound {
            stage: Stage::Activate,
            what: format!("{name}@{version}"),
        })?;

    if !pkg.prefix.is_dir() {
        return Err(InstallError::io(
            Stage::Activate,
            format!("prefix {} is missing", pkg.prefix.display()),
            io::Error::from(io::ErrorKind::NotFound),
        ));
    }

    check_conflicts(layout, db, name, &pkg.wrappers, Stage::Activate)?;

    let previous = db
        .active_package(name)
        .map_err(reg())?
        .filter(|p| p.version != pkg.version);

    if let Some(prev) = &previous {
        unlink(layout, prev, reporter)
            .map_err(|e| InstallError::io(Stage::Activate, "cannot remove old launchers", e))?;
    }

    let restore = |reporter: &R| {
        if let Some(prev) = &previous {
            if let Err(e) = link(layout, prev) {
                reporter.warning(&format!("could not restore {}@{}: {e}", prev.name, prev.version));
            }
        }
    };

    let written = match link(layout, &pkg) {
        Ok(written) => written,
        Err(e) => {
            restore(reporter);
            return Err(InstallError::io(Stage::Activate, "cannot write launchers", e));
        }
    };

    if let Err(e) = db.set_active(name, Some(version)) {
        for path in &written {
            std::fs::remove_file(path).ok();
        }
        restore(reporter);
        return Err(InstallError::Registry {
            stage: Stage::Activate,
            source: e,
        });
    }

    tracing::info!(%name, %version, "activated");
    Ok(InstalledPackage {
        active: true,
        ..pkg
    })
}

/// Switch the live launchers of `name` to `version` (`pour use`).
pub async fn activate(
    ctx: &Context,
    name: &PackageName,
    version: &Version,
) -> Result<InstalledPackage, InstallError> {
    let _lock = lock_package(&ctx.layout, name, Stage::Activate).await?;

    let layout = ctx.layout.clone();
    let reporter = ctx.reporter.clone();
    let (name, version) = (name.clone(), version.clone());

    tokio::task::spawn_blocking(move || {
        let db = open_db(&layout, Stage::Activate)?;
        if let Some(pinned) = db
            .pinned_version(&name)
            .map_err(InstallError::registry(Stage::Activate))?
        {
            if pinned != version {
                return Err(InstallError::Pinned {
                    name,
                    version: pinned,
                });
            }
        }

        let from = db
            .active_package(&name)
            .map_err(InstallError::registry(Stage::Activate))?
            .map(|p| p.version);
        let result = activate_locked(&layout, &db, &name, &version, &*reporter);
        db.add_history(&name, "use", from.as_ref(), Some(&version), result.is_ok())
            .ok();
        result
    })
    .await
    .map_err(|e| InstallError::task(Stage::Activate, e))?
}

/// Hold `name` at `version`, activating it if needed.
pub async fn pin(
    ctx: &Context,
    name: &PackageName,
    version: &Version,
) -> Result<InstalledPackage, InstallError> {
    let _lock = lock_package(&ctx.layout, name, Stage::Activate).await?;

    let layout = ctx.layout.clone();
    let reporter = ctx.reporter.clone();
    let (name, version) = (name.clone(), version.clone());

    tokio::task::spawn_blocking(move || {
        let db = open_db(&layout, Stage::Activate)?;
        let pkg = activate_locked(&layout, &db, &name, &version, &*reporter)?;
        db.set_pin(&name, &version)
            .map_err(InstallError::registry(Stage::Activate))?;
        db.add_history(&name, "pin", None, Some(&version), true).ok();
        Ok(pkg)
    })
    .await
    .map_err(|e| InstallError::task(Stage::Activate, e))?
}

/// Release a pin. Returns the version that was pinned, if any.
pub async fn unpin(ctx: &Context, name: &PackageName) -> Result<Option<Version>, InstallError> {
    let _lock = lock_package(&ctx.layout, name, Stage::Activate).await?;

    let layout = ctx.layout.clone();
    let name = name.clone();

    tokio::task::spawn_blocking(move || {
        let db = open_db(&layout, Stage::Activate)?;
        let reg = InstallError::registry;
        let pinned = db.pinned_version(&name).map_err(reg(Stage::Activate))?;
        if pinned.is_some() {
            db.clear_pin(&name).map_err(reg(Stage::Activate))?;
            db.add_history(&name, "unpin", pinned.as_ref(), None, true).ok();
        }
        Ok(pinned)
    })
    .await
    .map_err(|e| InstallError::task(Stage::Activate, e))?
}
