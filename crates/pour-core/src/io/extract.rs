//! Archive extraction module
//!
//! Handles tar.gz, tar.zst, tar, zip and raw single-file sources. Extraction
//! always targets a fresh staging directory; nothing here writes into a prefix.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use zip::ZipArchive;
use zstd::stream::Decoder as ZstdDecoder;

use pour_schema::{ArtifactFormat, ZSTD_MAGIC};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Archive error: {0}")]
    Archive(String),
}

fn archive_err(e: impl std::fmt::Display) -> ExtractError {
    ExtractError::Archive(e.to_string())
}

/// Information about an extracted file
#[derive(Debug, Clone)]
pub struct ExtractedFile {
    /// Path relative to extraction root
    pub relative_path: PathBuf,
    /// Absolute path on disk
    pub absolute_path: PathBuf,
    /// Whether this is an executable
    pub is_executable: bool,
}

/// Identify an archive by its leading bytes.
pub fn sniff_format(path: &Path) -> io::Result<Option<ArtifactFormat>> {
    let mut head = Vec::with_capacity(512);
    File::open(path)?.take(512).read_to_end(&mut head)?;

    let format = if head.starts_with(&[0x1f, 0x8b]) {
        Some(ArtifactFormat::TarGz)
    } else if head.starts_with(&ZSTD_MAGIC) {
        Some(ArtifactFormat::TarZst)
    } else if head.starts_with(b"PK\x03\x04") || head.starts_with(b"PK\x05\x06") {
        Some(ArtifactFormat::Zip)
    } else if head.len() >= 262 && &head[257..262] == b"ustar" {
        Some(ArtifactFormat::Tar)
    } else {
        None
    };
    Ok(format)
}

/// Detect archive format from file extension
pub fn format_from_extension(path: &Path) -> Option<ArtifactFormat> {
    let path_str = path.to_string_lossy().to_lowercase();

    if path_str.ends_with(".tar.zst") || path_str.ends_with(".tzst") {
        Some(ArtifactFormat::TarZst)
    } else if path_str.ends_with(".tar.gz") || path_str.ends_with(".tgz") {
        Some(ArtifactFormat::TarGz)
    } else if path_str.ends_with(".tar") {
        Some(ArtifactFormat::Tar)
    } else if path_str.ends_with(".zip") {
        Some(ArtifactFormat::Zip)
    } else {
        None
    }
}

/// Resolve the format to extract with: an explicit override wins, then the
/// archive's magic bytes, then its extension.
pub fn detect_format(
    archive_path: &Path,
    hint: Option<ArtifactFormat>,
) -> Result<ArtifactFormat, ExtractError> {
    if let Some(format) = hint {
        return Ok(format);
    }
    if let Some(format) = sniff_format(archive_path)? {
        return Ok(format);
    }
    format_from_extension(archive_path).ok_or_else(|| {
        ExtractError::UnsupportedFormat(
            archive_path
                .file_name()
                .map_or_else(String::new, |n| n.to_string_lossy().into_owned()),
        )
    })
}

/// Extract `archive_path` into `dest_dir` using `format`.
///
/// `file_name` names the single file produced for [`ArtifactFormat::Binary`].
pub fn extract_archive(
    archive_path: &Path,
    dest_dir: &Path,
    format: ArtifactFormat,
    file_name: &str,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    fs::create_dir_all(dest_dir)?;

    let files = match format {
        ArtifactFormat::TarZst => {
            let reader = BufReader::new(File::open(archive_path)?);
            extract_tar(ZstdDecoder::new(reader).map_err(archive_err)?, dest_dir)?
        }
        ArtifactFormat::TarGz => {
            let reader = BufReader::new(File::open(archive_path)?);
            extract_tar(flate2::read::GzDecoder::new(reader), dest_dir)?
        }
        ArtifactFormat::Tar => extract_tar(BufReader::new(File::open(archive_path)?), dest_dir)?,
        ArtifactFormat::Zip => extract_zip(archive_path, dest_dir)?,
        ArtifactFormat::Binary => extract_binary(archive_path, dest_dir, file_name)?,
    };

    if files.is_empty() {
        return Err(ExtractError::Archive("Empty archive".to_string()));
    }
    Ok(files)
}

/// Extract a tar archive from a reader
fn extract_tar<R: Read>(reader: R, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    let mut archive = tar::Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let mut extracted_files = Vec::new();

    for entry in archive.entries().map_err(archive_err)? {
        let mut entry = entry.map_err(archive_err)?;
        let relative_path: PathBuf = entry.path().map_err(archive_err)?.components().collect();

        // unpack_in refuses entries that would land outside dest_dir
        let unpacked = entry.unpack_in(dest_dir).map_err(archive_err)?;
        if !unpacked {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                relative_path.display()
            )));
        }

        if entry.header().entry_type().is_dir() {
            continue;
        }

        let is_executable = entry
            .header()
            .mode()
            .map(|m| m & 0o111 != 0)
            .unwrap_or(false);

        extracted_files.push(ExtractedFile {
            absolute_path: dest_dir.join(&relative_path),
            relative_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

/// Extract a zip archive
///
/// `enclosed_name` only checks entry names lexically, so symlink targets and
/// the resolved parent of every entry are checked against `dest_dir` too.
fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<ExtractedFile>, ExtractError> {
    let file = File::open(archive_path)?;
    let mut archive = ZipArchive::new(file).map_err(archive_err)?;
    let root = dest_dir.canonicalize()?;

    let mut extracted_files = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(archive_err)?;
        let Some(relative_path) = file.enclosed_name() else {
            return Err(ExtractError::Archive(format!(
                "Invalid path in archive: {}",
                file.name()
            )));
        };
        let absolute_path = dest_dir.join(&relative_path);

        if file.is_dir() {
            ensure_within(&root, &absolute_path)?;
            fs::create_dir_all(&absolute_path)?;
            continue;
        }

        if let Some(p) = absolute_path.parent() {
            ensure_within(&root, p)?;
            fs::create_dir_all(p)?;
        }
        if absolute_path.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink()) {
            return Err(ExtractError::Archive(format!(
                "Entry would overwrite a symlink: {}",
                relative_path.display()
            )));
        }

        let mode = file.unix_mode();

        #[cfg(unix)]
        if mode.is_some_and(|m| m & 0o170_000 == 0o120_000) {
            let mut target = String::new();
            file.read_to_string(&mut target).map_err(archive_err)?;
            if !link_stays_inside(&relative_path, &target) {
                return Err(ExtractError::Archive(format!(
                    "Symlink {} points outside the archive: {target}",
                    relative_path.display()
                )));
            }
            std::os::unix::fs::symlink(&target, &absolute_path)?;
            extracted_files.push(ExtractedFile {
                relative_path,
                absolute_path,
                is_executable: false,
            });
            continue;
        }

        let mut outfile = File::create(&absolute_path)?;
        io::copy(&mut file, &mut outfile).map_err(archive_err)?;

        #[cfg(unix)]
        let is_executable = if let Some(mode) = mode {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&absolute_path, fs::Permissions::from_mode(mode & 0o7777))?;
            mode & 0o111 != 0
        } else {
            false
        };
        #[cfg(not(unix))]
        let is_executable = mode.is_some_and(|m| m & 0o111 != 0);

        extracted_files.push(ExtractedFile {
            relative_path,
            absolute_path,
            is_executable,
        });
    }

    Ok(extracted_files)
}

/// Fail unless the nearest existing ancestor of `path` resolves under `root`.
fn ensure_within(root: &Path, path: &Path) -> Result<(), ExtractError> {
    let Some(existing) = path.ancestors().find(|p| p.exists()) else {
        return Err(ExtractError::Archive(format!(
            "Entry escapes staging: {}",
            path.display()
        )));
    };
    if existing.canonicalize()?.starts_with(root) {
        Ok(())
    } else {
        Err(ExtractError::Archive(format!(
            "Entry escapes staging: {}",
            path.display()
        )))
    }
}

/// Whether a symlink at `entry` pointing to `target` stays inside the archive
/// root, judged on the names alone.
fn link_stays_inside(entry: &Path, target: &str) -> bool {
    let parent = entry.parent().unwrap_or_else(|| Path::new(""));
    let mut depth = 0usize;
    for component in parent.components().chain(Path::new(target).components()) {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => match depth.checked_sub(1) {
                Some(d) => depth = d,
                None => return false,
            },
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

/// Stage a raw single-file source as an executable.
fn extract_binary(
    archive_path: &Path,
    dest_dir: &Path,
    file_name: &str,
) -> Result<Vec<ExtractedFile>, ExtractError> {
    if file_name.is_empty() || file_name.contains('/') {
        return Err(ExtractError::Archive(format!(
            "Invalid file name for raw source: '{file_name}'"
        )));
    }
    let dest_path = dest_dir.join(file_name);
    fs::copy(archive_path, &dest_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&dest_path, fs::Permissions::from_mode(0o755))?;
    }

    Ok(vec![ExtractedFile {
        relative_path: PathBuf::from(file_name),
        absolute_path: dest_path,
        is_executable: true,
    }])
}

/// Pick the directory install actions resolve against.
///
/// Archives commonly wrap their payload in one top-level directory
/// (`pomodoro-0.1/pomodoro_for_mac.app`). When the requested paths are not at
/// the staging root but are inside such a single directory, that directory is
/// used instead.
pub fn source_root<'a>(staging: &Path, wanted: impl IntoIterator<Item = &'a str>) -> PathBuf {
    let wanted: Vec<&str> = wanted.into_iter().collect();
    let present = |root: &Path| {
        wanted
            .iter()
            .all(|p| root.join(p).symlink_metadata().is_ok())
    };

    if present(staging) {
        return staging.to_path_buf();
    }
    match single_top_level_dir(staging) {
        Some(inner) if present(&inner) => inner,
        _ => staging.to_path_buf(),
    }
}

fn single_top_level_dir(dir: &Path) -> Option<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(dir).ok()?.filter_map(Result::ok).collect();

    // Filter out hidden files (like .DS_Store)
    entries.retain(|e| !e.file_name().to_string_lossy().starts_with('.'));

    if entries.len() == 1 && entries[0].file_type().ok()?.is_dir() {
        Some(entries[0].path())
    } else {
        None
    }
}
