//! Per-package advisory locks.
//!
//! Two pour processes working on the same package name serialize on
//! `var/locks/<name>.lock`. Different packages never contend. Lock files are
//! left in place after release; only the OS lock matters.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

use crate::paths::Layout;
use pour_schema::PackageName;

/// Exclusive lock on one package name, released on drop.
#[derive(Debug)]
pub struct PackageLock {
    file: File,
    path: PathBuf,
}

impl PackageLock {
    /// Block until the lock for `name` is held.
    pub fn acquire(layout: &Layout, name: &PackageName) -> io::Result<Self> {
        let path = layout.locks_dir().join(format!("{name}.lock"));
        Self::acquire_at(&path)
    }

    /// Like [`acquire`](Self::acquire), waiting on the blocking pool.
    pub async fn acquire_async(layout: &Layout, name: &PackageName) -> io::Result<Self> {
        let layout = layout.clone();
        let name = name.clone();
        tokio::task::spawn_blocking(move || Self::acquire(&layout, &name))
            .await
            .map_err(io::Error::other)?
    }

    fn acquire_at(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        FileExt::lock_exclusive(&file)?;
        tracing::trace!(path = %path.display(), "lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PackageLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), "failed to release lock: {e}");
        }
    }
}
