//! Installation Flow Typestate Pattern
//!
//! Models the front half of the pipeline as explicit state transitions:
//!
//! ```text
//! fetch() --> FetchedArchive --[verify()]--> VerifiedArchive --[extract()]--> StagedSource
//! ```
//!
//! `VerifiedArchive` can only be built by [`FetchedArchive::verify`], so there
//! is no way to unpack an archive whose digest has not been checked.
//!
//! # Usage
//!
//! ```ignore
//! let fetched = flow::fetch(&ctx, &manifest).await?;
//! let verified = fetched.verify(&*ctx.reporter).await?;
//! let staged = verified.extract(&ctx.layout, &*ctx.reporter).await?;
//! ```

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::ops::{Context, InstallError, Stage};
use pour_core::Reporter;
use pour_core::io::download::DownloadRequest;
use pour_core::io::{extract, verify};
use pour_core::paths::Layout;
use pour_schema::{ArtifactFormat, Manifest, PackageName, Sha256Digest, Version};

/// State 1: the source archive is on local disk, digest not yet checked.
#[derive(Debug)]
pub struct FetchedArchive {
    name: PackageName,
    version: Version,
    path: PathBuf,
    expected: Sha256Digest,
    format: Option<ArtifactFormat>,
    file_name: String,
    copy_paths: Vec<String>,
}

/// State 2: the archive's digest matched the manifest.
#[derive(Debug)]
pub struct VerifiedArchive {
    fetched: FetchedArchive,
    digest: Sha256Digest,
}

/// State 3: the archive has been unpacked into a private staging directory.
///
/// The staging directory is deleted when this value is dropped.
#[derive(Debug)]
pub struct StagedSource {
    /// Package name.
    pub name: PackageName,
    /// Package version.
    pub version: Version,
    /// Digest of the archive the files came from.
    pub content_hash: Sha256Digest,
    /// Directory install actions resolve their paths against.
    pub root: PathBuf,
    staging: TempDir,
}

/// Bring the manifest's source archive into the download cache.
///
/// A cached copy that already hashes to `content_hash` is reused without any
/// network traffic.
pub async fn fetch(ctx: &Context, manifest: &Manifest) -> Result<FetchedArchive, InstallError> {
    let file_name = manifest.archive_file_name().to_string();
    let path = ctx
        .layout
        .cached_archive(&manifest.content_hash, &file_name);

    let fetched = FetchedArchive {
        name: manifest.name.clone(),
        version: manifest.version.clone(),
        path,
        expected: manifest.content_hash.clone(),
        format: manifest.format,
        file_name,
        copy_paths: manifest.copy_paths().map(str::to_string).collect(),
    };

    if cache_is_valid(&fetched.path, &fetched.expected).await {
        tracing::debug!(path = %fetched.path.display(), "reusing cached archive");
        return Ok(fetched);
    }

    let size = DownloadRequest {
        client: &ctx.client,
        pkg_name: &fetched.name,
        version: &fetched.version,
        url: &manifest.source_url,
        dest: &fetched.path,
        reporter: &*ctx.reporter,
    }
    .execute()
    .await
    .inspect_err(|e| {
        tracing::warn!(url = %manifest.source_url, network = e.is_network(), "download failed: {e}");
    })?;

    tracing::debug!(url = %manifest.source_url, size, "fetched");
    Ok(fetched)
}

async fn cache_is_valid(path: &Path, expected: &Sha256Digest) -> bool {
    if tokio::fs::metadata(path).await.is_err() {
        return false;
    }
    let path = path.to_path_buf();
    let expected = expected.clone();
    tokio::task::spawn_blocking(move || verify::verify_file(&path, &expected).is_ok())
        .await
        .unwrap_or(false)
}

impl FetchedArchive {
    /// Local path of the archive.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check the archive against the manifest digest.
    ///
    /// A mismatching archive is deleted from the cache so the next attempt
    /// downloads it again.
    pub async fn verify<R: Reporter + ?Sized>(
        self,
        reporter: &R,
    ) -> Result<VerifiedArchive, InstallError> {
        reporter.verifying(&self.name, &self.version);

        let path = self.path.clone();
        let expected = self.expected.clone();
        let result = tokio::task::spawn_blocking(move || verify::verify_file(&path, &expected))
            .await
            .map_err(|e| InstallError::task(Stage::Verify, e))?;

        match result {
            Ok(digest) => Ok(VerifiedArchive {
                fetched: self,
                digest,
            }),
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&self.path).await {
                    tracing::warn!(path = %self.path.display(), "failed to drop bad archive: {rm}");
                }
                Err(e.into())
            }
        }
    }
}

impl VerifiedArchive {
    /// Digest of the verified archive.
    pub fn digest(&self) -> &Sha256Digest {
        &self.digest
    }

    /// Unpack into a fresh directory under `tmp/`.
    pub async fn extract<R: Reporter + ?Sized>(
        self,
        layout: &Layout,
        reporter: &R,
    ) -> Result<StagedSource, InstallError> {
        let f = &self.fetched;
        reporter.extracting(&f.name, &f.version);

        let tmp = layout.tmp_dir();
        std::fs::create_dir_all(&tmp)
            .map_err(|e| InstallError::io(Stage::Extract, "cannot create tmp", e))?;
        let staging = tempfile::Builder::new()
            .prefix(&format!("{}-{}.", f.name, f.version))
            .tempdir_in(&tmp)
            .map_err(|e| InstallError::io(Stage::Extract, "cannot create staging", e))?;

        let archive = f.path.clone();
        let dest = staging.path().to_path_buf();
        let hint = f.format;
        let file_name = f.file_name.clone();
        let copy_paths = f.copy_paths.clone();

        let root = tokio::task::spawn_blocking(move || {
            let format = extract::detect_format(&archive, hint)?;
            tracing::debug!(%format, archive = %archive.display(), "extracting");
            let files = extract::extract_archive(&archive, &dest, format, &file_name)?;
            tracing::debug!(count = files.len(), "extracted");
            Ok::<_, extract::ExtractError>(extract::source_root(
                &dest,
                copy_paths.iter().map(String::as_str),
            ))
        })
        .await
        .map_err(|e| InstallError::task(Stage::Extract, e))??;

        Ok(StagedSource {
            name: self.fetched.name,
            version: self.fetched.version,
            content_hash: self.digest,
            root,
            staging,
        })
    }
}

impl StagedSource {
    /// The staging directory itself (parent of, or equal to, `root`).
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }
}
