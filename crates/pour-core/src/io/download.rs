//! Streaming downloads into the archive cache.
//!
//! Bytes are written to a `.part` sibling of the destination and renamed into
//! place once the body has been fully received, so a cache entry under its
//! final name is always complete. Digest checking is a separate pass (see
//! [`crate::io::verify`]).

use std::path::{Path, PathBuf};

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::Reporter;
use pour_schema::{PackageName, Version};

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Cannot read local source {url}: {source}")]
    LocalSource {
        url: String,
        source: std::io::Error,
    },

    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Whether the failure is on the remote side rather than the local disk.
    pub fn is_network(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }

    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Request for a download operation
pub struct DownloadRequest<'a, R: Reporter + ?Sized> {
    pub client: &'a Client,
    pub pkg_name: &'a PackageName,
    pub version: &'a Version,
    pub url: &'a str,
    pub dest: &'a Path,
    pub reporter: &'a R,
}

impl<R: Reporter + ?Sized> std::fmt::Debug for DownloadRequest<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRequest")
            .field("pkg_name", self.pkg_name)
            .field("url", &self.url)
            .field("dest", &self.dest)
            .finish_non_exhaustive()
    }
}

impl<R: Reporter + ?Sized> DownloadRequest<'_, R> {
    /// Execute the download, returning the number of bytes written.
    pub async fn execute(self) -> Result<u64, DownloadError> {
        if let Some(parent) = self.dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }

        let part = part_path(self.dest);
        let result = if let Some(local) = self.url.strip_prefix("file://") {
            copy_local(self.url, Path::new(local), &part).await
        } else if self.url.starts_with("http://") || self.url.starts_with("https://") {
            stream_remote(&self, &part).await
        } else {
            Err(DownloadError::UnsupportedUrl(self.url.to_string()))
        };

        match result {
            Ok(size) => {
                tokio::fs::rename(&part, self.dest)
                    .await
                    .map_err(|e| DownloadError::io(self.dest, e))?;
                tracing::debug!(url = self.url, dest = %self.dest.display(), size, "download complete");
                Ok(size)
            }
            Err(e) => {
                tokio::fs::remove_file(&part).await.ok();
                Err(e)
            }
        }
    }
}

async fn stream_remote<R: Reporter + ?Sized>(
    req: &DownloadRequest<'_, R>,
    part: &Path,
) -> Result<u64, DownloadError> {
    let response = req.client.get(req.url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(DownloadError::Status {
            url: req.url.to_string(),
            status,
        });
    }

    let total_size = response.content_length();
    req.reporter
        .downloading(req.pkg_name, req.version, 0, total_size);

    let mut file = File::create(part)
        .await
        .map_err(|e| DownloadError::io(part, e))?;
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(part, e))?;
        downloaded += chunk.len() as u64;
        req.reporter
            .downloading(req.pkg_name, req.version, downloaded, total_size);
    }

    file.flush().await.map_err(|e| DownloadError::io(part, e))?;
    Ok(downloaded)
}

async fn copy_local(url: &str, source: &Path, part: &Path) -> Result<u64, DownloadError> {
    if tokio::fs::metadata(source).await.is_err() {
        return Err(DownloadError::LocalSource {
            url: url.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        });
    }
    tokio::fs::copy(source, part)
        .await
        .map_err(|e| DownloadError::io(part, e))
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
