//! Package installation operations.
//!
//! The entry point is [`install_package`], which runs one manifest through
//! lock, plan, fetch, verify, extract, place and record. Placement is the
//! only step that touches the cellar, and it does so with a single rename.

use std::io;
use std::path::{Path, PathBuf};

use pour_core::io::fs::{dir_size, list_files, move_path};
use pour_core::{Layout, Reporter};
use pour_schema::{Action, InstalledPackage, Manifest, PackageName, WrapperLink};

use crate::ops::flow::{self, StagedSource};
use crate::ops::{Context, InstallError, Stage, lock_package, open_db, switch};
use crate::store::StateDb;

/// Flags for one install.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Reinstall even if the same version and digest are already present.
    pub force: bool,
    /// Report what would happen without touching anything.
    pub dry_run: bool,
}

/// What [`install_package`] ended up doing.
#[derive(Debug)]
pub enum InstallOutcome {
    /// Fetched and placed into its prefix.
    Installed(InstalledPackage),
    /// Already placed; only its launchers were switched on.
    Switched(InstalledPackage),
    /// Identical version already present; nothing changed.
    AlreadyInstalled(InstalledPackage),
    /// Dry run; nothing changed.
    Planned,
}

/// # Implementation Note: Install Planning
///
/// We separate "what the user asked for" from "what we need to do":
/// 1. `Fresh`: the version is missing, forced, or its recorded digest differs.
/// 2. `Switch`: the identical version is already in the cellar, just inactive.
/// 3. `AlreadyInstalled`: identical version is active (or a pin holds another).
///
/// Only `Fresh` touches the network.
#[derive(Debug)]
enum Plan {
    Fresh,
    Switch,
    AlreadyInstalled(InstalledPackage),
}

fn plan(db: &StateDb, manifest: &Manifest, force: bool) -> Result<Plan, InstallError> {
    let reg = || InstallError::registry(Stage::Install);
    let existing = db
        .get_package(&manifest.name, &manifest.version)
        .map_err(reg())?;

    let Some(pkg) = existing else {
        return Ok(Plan::Fresh);
    };
    if force || pkg.content_hash != manifest.content_hash || !pkg.prefix.is_dir() {
        return Ok(Plan::Fresh);
    }
    if pkg.active {
        return Ok(Plan::AlreadyInstalled(pkg));
    }
    match db.pinned_version(&manifest.name).map_err(reg())? {
        Some(pinned) if pinned != manifest.version => Ok(Plan::AlreadyInstalled(pkg)),
        _ => Ok(Plan::Switch),
    }
}

/// Install one manifest end to end.
pub async fn install_package(
    ctx: &Context,
    manifest: &Manifest,
    opts: InstallOptions,
) -> Result<InstallOutcome, InstallError> {
    manifest.validate()?;
    let name = &manifest.name;
    let version = &manifest.version;

    let _lock = lock_package(&ctx.layout, name, Stage::Install).await?;

    let db = open_db(&ctx.layout, Stage::Install)?;
    let plan = plan(&db, manifest, opts.force)?;
    let previous = db
        .active_package(name)
        .map_err(InstallError::registry(Stage::Install))?
        .map(|p| p.version);
    drop(db);

    match plan {
        Plan::AlreadyInstalled(pkg) => {
            tracing::debug!(%name, %version, "already installed");
            ctx.reporter
                .done(name, version, "already installed", Some(pkg.size_bytes));
            return Ok(InstallOutcome::AlreadyInstalled(pkg));
        }
        Plan::Switch if opts.dry_run => {
            ctx.reporter
                .info(&format!("(dry run) would activate {name} {version}"));
            return Ok(InstallOutcome::Planned);
        }
        Plan::Switch => {
            ctx.reporter.installing(name, version);
            let layout = ctx.layout.clone();
            let reporter = ctx.reporter.clone();
            let (n, v) = (name.clone(), version.clone());
            let pkg = tokio::task::spawn_blocking(move || {
                let db = open_db(&layout, Stage::Activate)?;
                let result = switch::activate_locked(&layout, &db, &n, &v, &*reporter);
                db.add_history(&n, "use", previous.as_ref(), Some(&v), result.is_ok())
                    .ok();
                result
            })
            .await
            .map_err(|e| InstallError::task(Stage::Activate, e))??;
            ctx.reporter
                .done(name, version, "activated", Some(pkg.size_bytes));
            return Ok(InstallOutcome::Switched(pkg));
        }
        Plan::Fresh => {}
    }

    if opts.dry_run {
        ctx.reporter.info(&format!(
            "(dry run) would fetch {} and install into {}",
            manifest.source_url,
            ctx.layout.prefix(name, version).display()
        ));
        return Ok(InstallOutcome::Planned);
    }

    let result = fetch_and_place(ctx, manifest).await;

    if let Ok(db) = open_db(&ctx.layout, Stage::Install) {
        db.add_history(
            name,
            "install",
            previous.as_ref(),
            Some(version),
            result.is_ok(),
        )
        .ok();
    }

    let pkg = result?;

    if !ctx.settings.keep_downloads {
        let cached = ctx
            .layout
            .cached_archive(&manifest.content_hash, manifest.archive_file_name());
        if let Err(e) = std::fs::remove_file(&cached) {
            tracing::warn!(path = %cached.display(), "failed to drop cached archive: {e}");
        }
    }

    let detail = if pkg.active {
        "installed"
    } else {
        "installed (pinned version stays active)"
    };
    ctx.reporter
        .done(name, version, detail, Some(pkg.size_bytes));
    Ok(InstallOutcome::Installed(pkg))
}

async fn fetch_and_place(
    ctx: &Context,
    manifest: &Manifest,
) -> Result<InstalledPackage, InstallError> {
    let fetched = flow::fetch(ctx, manifest).await?;
    let verified = fetched.verify(&*ctx.reporter).await?;
    let staged = verified.extract(&ctx.layout, &*ctx.reporter).await?;
    install(ctx, manifest, staged).await
}

/// Apply the install actions to a staged source and place the result.
///
/// Every action runs against a private prefix under `tmp/`; the cellar only
/// changes when that prefix is renamed into `cellar/<name>/<version>`. Any
/// failure after that rename undoes it and restores the previously active
/// version.
pub async fn install(
    ctx: &Context,
    manifest: &Manifest,
    staged: StagedSource,
) -> Result<InstalledPackage, InstallError> {
    ctx.reporter.installing(&manifest.name, &manifest.version);

    let layout = ctx.layout.clone();
    let reporter = ctx.reporter.clone();
    let manifest = manifest.clone();

    tokio::task::spawn_blocking(move || place(&layout, &manifest, &staged, &*reporter))
        .await
        .map_err(|e| InstallError::task(Stage::Install, e))?
}

fn io_err(context: impl std::fmt::Display) -> impl FnOnce(io::Error) -> InstallError {
    move |e| InstallError::io(Stage::Install, context, e)
}

fn missing(context: String) -> InstallError {
    InstallError::io(
        Stage::Install,
        context,
        io::Error::from(io::ErrorKind::NotFound),
    )
}

fn place<R: Reporter + ?Sized>(
    layout: &Layout,
    manifest: &Manifest,
    staged: &StagedSource,
    reporter: &R,
) -> Result<InstalledPackage, InstallError> {
    let name = &manifest.name;
    let version = &manifest.version;
    let reg = || InstallError::registry(Stage::Install);
    let db = open_db(layout, Stage::Install)?;

    let work = tempfile::Builder::new()
        .prefix(&format!("{name}-{version}.place."))
        .tempdir_in(layout.tmp_dir())
        .map_err(io_err("cannot create work directory"))?;
    let staged_prefix = work.path().join("prefix");
    std::fs::create_dir_all(&staged_prefix).map_err(io_err("cannot create prefix"))?;

    let mut wrappers = Vec::new();
    for action in &manifest.install {
        match action {
            Action::CopyIntoPrefix { path } => {
                let src = staged.root.join(path);
                if src.symlink_metadata().is_err() {
                    return Err(missing(format!("{path} not found in archive")));
                }
                move_path(&src, &staged_prefix.join(path))
                    .map_err(io_err(format!("cannot copy {path} into prefix")))?;
                tracing::debug!(%path, "copied into prefix");
            }
            Action::WriteExecutableWrapper { target, name: link } => {
                if !staged_prefix.join(target).is_file() {
                    return Err(missing(format!(
                        "launcher target {target} is not a file in the prefix"
                    )));
                }
                wrappers.push(WrapperLink {
                    name: link.clone().unwrap_or_else(|| name.to_string()),
                    target: PathBuf::from(target),
                });
            }
        }
    }

    switch::check_conflicts(layout, &db, name, &wrappers, Stage::Install)?;

    let pinned = db.pinned_version(name).map_err(reg())?;
    let activate = pinned.as_ref().is_none_or(|p| p == version);
    let previous = db.active_package(name).map_err(reg())?;

    let final_prefix = layout.prefix(name, version);
    let installed_files = list_files(&staged_prefix)
        .map_err(io_err("cannot list prefix"))?
        .into_iter()
        .filter_map(|p| {
            p.strip_prefix(&staged_prefix)
                .ok()
                .map(|rel| final_prefix.join(rel))
        })
        .collect();

    let pkg = InstalledPackage {
        name: name.clone(),
        version: version.clone(),
        prefix: final_prefix.clone(),
        content_hash: staged.content_hash.clone(),
        installed_files,
        wrappers,
        active: activate,
        size_bytes: dir_size(&staged_prefix),
    };

    let staged_wrappers = if activate {
        switch::stage_wrappers(layout, &pkg).map_err(io_err("cannot stage launchers"))?
    } else {
        Vec::new()
    };

    // Nothing outside tmp/ has changed up to here.
    let displaced = work.path().join("displaced");
    let had_old = final_prefix.symlink_metadata().is_ok();
    if had_old {
        std::fs::rename(&final_prefix, &displaced)
            .map_err(io_err("cannot move old prefix aside"))?;
    }
    let placed = final_prefix
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::rename(&staged_prefix, &final_prefix));
    if let Err(e) = placed {
        if had_old {
            std::fs::rename(&displaced, &final_prefix).ok();
        }
        return Err(InstallError::io(Stage::Install, "cannot place prefix", e));
    }
    tracing::info!(prefix = %final_prefix.display(), "placed");

    let rollback = |committed: &[PathBuf]| {
        tracing::warn!(%name, %version, "rolling back");
        for path in committed {
            std::fs::remove_file(path).ok();
        }
        if let Err(e) = std::fs::rename(&final_prefix, work.path().join("failed")) {
            reporter.warning(&format!("could not remove {}: {e}", final_prefix.display()));
        }
        if had_old {
            if let Err(e) = std::fs::rename(&displaced, &final_prefix) {
                reporter.warning(&format!("could not restore {}: {e}", final_prefix.display()));
            }
        }
        if activate {
            if let Some(prev) = &previous {
                if let Err(e) = switch::link(layout, prev) {
                    reporter.warning(&format!(
                        "could not reactivate {}@{}: {e}",
                        prev.name, prev.version
                    ));
                }
            }
        }
        std::fs::remove_dir(layout.package_dir(name)).ok();
    };

    let mut committed = Vec::new();
    if activate {
        // A same-version reinstall may rename launchers, so the old set goes too.
        if let Some(prev) = &previous {
            if let Err(e) = switch::unlink(layout, prev, reporter) {
                rollback(&[]);
                return Err(InstallError::io(
                    Stage::Activate,
                    "cannot remove old launchers",
                    e,
                ));
            }
        }
        match switch::commit_wrappers(staged_wrappers) {
            Ok(paths) => committed = paths,
            Err(e) => {
                rollback(&[]);
                return Err(InstallError::io(
                    Stage::Activate,
                    "cannot write launchers",
                    e,
                ));
            }
        }
    }

    if let Err(e) = db.record_install(&pkg) {
        rollback(&committed);
        return Err(InstallError::Registry {
            stage: Stage::Install,
            source: e,
        });
    }

    tracing::info!(%name, %version, active = pkg.active, "installed");
    Ok(pkg)
}

/// Post-install hints: `bin/` missing from PATH, or launchers shadowed by
/// another executable earlier on PATH.
pub fn perform_ux_checks<R: Reporter + ?Sized>(layout: &Layout, names: &[String], reporter: &R) {
    let path_env = std::env::var_os("PATH").unwrap_or_default();
    let bin_dir = layout.bin_dir();
    let is_in_path = std::env::split_paths(&path_env).any(|p| p == bin_dir);

    if !is_in_path {
        reporter.warning(&format!("{} is not in your PATH.", bin_dir.display()));
        reporter.info(&format!(
            "Add this to your shell profile: export PATH=\"{}:$PATH\"",
            bin_dir.display()
        ));
        return;
    }

    for name in names {
        if let Ok(path) = which::which(name) {
            if !path.starts_with(&bin_dir) {
                reporter.warning(&format!(
                    "'{}' is shadowed by {}",
                    name,
                    path.display()
                ));
            }
        }
    }
}

/// Names of the launchers a set of outcomes made live.
pub fn live_launchers(outcomes: &[InstallOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .filter_map(|o| match o {
            InstallOutcome::Installed(p)
            | InstallOutcome::Switched(p)
            | InstallOutcome::AlreadyInstalled(p) => p.active.then_some(p),
            InstallOutcome::Planned => None,
        })
        .flat_map(|p| p.wrappers.iter().map(|w| w.name.clone()))
        .collect()
}

/// Load a manifest by path, or by bare name from the formula directory.
pub fn resolve_formula(ctx: &Context, arg: &str) -> Result<Manifest, InstallError> {
    let as_path = Path::new(arg);
    let path = if as_path.is_file() || arg.ends_with(".toml") {
        as_path.to_path_buf()
    } else {
        ctx.settings
            .formula_dir(&ctx.layout)
            .join(format!("{}.toml", PackageName::new(arg)))
    };
    Ok(Manifest::from_file(&path)?)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pour_core::NullReporter;
    use pour_core::wrapper;
    use pour_schema::{Sha256Digest, Version};
    use std::sync::Arc;
    use tempfile::TempDir;

    pub(crate) const TARGET: &str = "pomodoro_for_mac.app/Contents/MacOS/pomodoro_for_mac";

    pub(crate) fn archive(tag: &str) -> Vec<u8> {
        let script = format!("#!/bin/sh\necho {tag}\n");
        let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::default(),
        ));
        let mut header = tar::Header::new_gnu();
        header.set_size(script.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, TARGET, script.as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap()
    }

    pub(crate) fn context(dir: &TempDir) -> Context {
        Context::new(
            Layout::new(dir.path().join("home")).unwrap(),
            pour_core::Settings::default(),
            reqwest::Client::new(),
            Arc::new(NullReporter),
        )
    }

    /// Write `bytes` next to the home and return a manifest pointing at it.
    pub(crate) fn manifest(dir: &TempDir, version: &str, bytes: &[u8], target: &str) -> Manifest {
        let source = dir.path().join(format!("pomodoro-{version}.tar.gz"));
        std::fs::write(&source, bytes).unwrap();
        let digest = Sha256Digest::from_bytes(<sha2::Sha256 as sha2::Digest>::digest(bytes));
        Manifest::parse(&format!(
            r#"
            name = "pomodoromac"
            source_url = "file://{}"
            content_hash = "{digest}"
            version = "{version}"

            [[install]]
            action = "copy_into_prefix"
            path = "pomodoro_for_mac.app"

            [[install]]
            action = "write_executable_wrapper"
            target = "{target}"
            "#,
            source.display()
        ))
        .unwrap()
    }

    fn installed(outcome: InstallOutcome) -> InstalledPackage {
        match outcome {
            InstallOutcome::Installed(p) => p,
            other => panic!("expected a fresh install, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn installs_prefix_launcher_and_record() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let m = manifest(&dir, "0.1", &archive("v1"), TARGET);

        let pkg = installed(
            install_package(&ctx, &m, InstallOptions::default())
                .await
                .unwrap(),
        );

        assert!(pkg.active);
        assert_eq!(pkg.prefix, ctx.layout.prefix(&m.name, &m.version));
        assert!(pkg.installed_files.contains(&pkg.prefix.join(TARGET)));
        let launcher = ctx.layout.bin_dir().join("pomodoromac");
        assert_eq!(
            wrapper::read_target(&launcher),
            Some(pkg.prefix.join(TARGET))
        );

        let db = ctx.open_db(Stage::Install).unwrap();
        assert_eq!(
            db.active_package(&m.name).unwrap().map(|p| p.version),
            Some(Version::new("0.1"))
        );
    }

    #[tokio::test]
    async fn second_install_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let m = manifest(&dir, "0.1", &archive("v1"), TARGET);

        let first = installed(
            install_package(&ctx, &m, InstallOptions::default())
                .await
                .unwrap(),
        );
        // Without the source the second run can only succeed without fetching.
        std::fs::remove_file(dir.path().join("pomodoro-0.1.tar.gz")).unwrap();
        std::fs::remove_dir_all(ctx.layout.cache_dir()).unwrap();

        match install_package(&ctx, &m, InstallOptions::default())
            .await
            .unwrap()
        {
            InstallOutcome::AlreadyInstalled(p) => {
                assert_eq!(p.installed_files, first.installed_files);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_placement_leaves_no_prefix() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let m = manifest(&dir, "0.1", &archive("v1"), "pomodoro_for_mac.app/missing");

        let err = install_package(&ctx, &m, InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Install);
        assert!(!ctx.layout.package_dir(&m.name).exists());
        assert!(!ctx.layout.bin_dir().join("pomodoromac").exists());
        let leftovers = std::fs::read_dir(ctx.layout.tmp_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn newer_version_takes_over_unless_pinned() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let v1 = manifest(&dir, "0.1", &archive("v1"), TARGET);
        let v2 = manifest(&dir, "0.2", &archive("v2"), TARGET);
        let v3 = manifest(&dir, "0.3", &archive("v3"), TARGET);
        let launcher = ctx.layout.bin_dir().join("pomodoromac");

        install_package(&ctx, &v1, InstallOptions::default()).await.unwrap();
        install_package(&ctx, &v2, InstallOptions::default()).await.unwrap();
        assert!(wrapper::points_into(&launcher, &ctx.layout.prefix(&v2.name, &v2.version)));
        assert!(ctx.layout.prefix(&v1.name, &v1.version).is_dir());

        switch::pin(&ctx, &v1.name, &v1.version).await.unwrap();
        let pkg = installed(
            install_package(&ctx, &v3, InstallOptions::default())
                .await
                .unwrap(),
        );
        assert!(!pkg.active);
        assert!(wrapper::points_into(&launcher, &ctx.layout.prefix(&v1.name, &v1.version)));

        let err = switch::activate(&ctx, &v3.name, &v3.version).await.unwrap_err();
        assert!(matches!(err, InstallError::Pinned { .. }));
    }

    #[tokio::test]
    async fn foreign_file_in_bin_is_a_conflict() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let m = manifest(&dir, "0.1", &archive("v1"), TARGET);
        std::fs::create_dir_all(ctx.layout.bin_dir()).unwrap();
        std::fs::write(ctx.layout.bin_dir().join("pomodoromac"), "mine").unwrap();

        let err = install_package(&ctx, &m, InstallOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, InstallError::Io { stage: Stage::Install, .. }));
        assert_eq!(
            std::fs::read_to_string(ctx.layout.bin_dir().join("pomodoromac")).unwrap(),
            "mine"
        );
        assert!(!ctx.layout.package_dir(&m.name).exists());
    }

    #[tokio::test]
    async fn reinstalling_an_inactive_version_switches_back() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let v1 = manifest(&dir, "0.1", &archive("v1"), TARGET);
        let v2 = manifest(&dir, "0.2", &archive("v2"), TARGET);
        install_package(&ctx, &v1, InstallOptions::default()).await.unwrap();
        install_package(&ctx, &v2, InstallOptions::default()).await.unwrap();

        let outcome = install_package(&ctx, &v1, InstallOptions::default())
            .await
            .unwrap();

        assert!(matches!(outcome, InstallOutcome::Switched(ref p) if p.active));
        let launcher = ctx.layout.bin_dir().join("pomodoromac");
        assert!(wrapper::points_into(&launcher, &ctx.layout.prefix(&v1.name, &v1.version)));
    }

    #[tokio::test]
    async fn switching_never_overwrites_a_foreign_launcher() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let v1 = manifest(&dir, "0.1", &archive("v1"), TARGET);
        let v2 = manifest(&dir, "0.2", &archive("v2"), TARGET);
        install_package(&ctx, &v1, InstallOptions::default()).await.unwrap();
        install_package(&ctx, &v2, InstallOptions::default()).await.unwrap();
        let launcher = ctx.layout.bin_dir().join("pomodoromac");
        std::fs::write(&launcher, "mine").unwrap();

        let err = switch::activate(&ctx, &v1.name, &v1.version).await.unwrap_err();

        assert!(matches!(err, InstallError::Io { stage: Stage::Activate, .. }));
        assert_eq!(std::fs::read_to_string(&launcher).unwrap(), "mine");
        let db = ctx.open_db(Stage::Activate).unwrap();
        assert_eq!(
            db.active_package(&v1.name).unwrap().map(|p| p.version),
            Some(Version::new("0.2"))
        );
    }

    #[tokio::test]
    async fn dry_run_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let m = manifest(&dir, "0.1", &archive("v1"), TARGET);
        let opts = InstallOptions {
            dry_run: true,
            ..InstallOptions::default()
        };

        let outcome = install_package(&ctx, &m, opts).await.unwrap();
        assert!(matches!(outcome, InstallOutcome::Planned));
        assert!(!ctx.layout.cellar().exists());
        assert!(!ctx.layout.cache_dir().exists());
    }
}
