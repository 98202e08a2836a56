//! Filesystem staging helpers.
//!
//! Every operation is safe to call speculatively: when the target state
//! already holds (destination present, nothing to copy) it returns `false`
//! and leaves the file system untouched. Errors are reserved for genuine
//! write failures.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Extension appended to a directory path by [`zip_dir`].
pub const ZIP_EXTENSION: &str = "zip";

/// Errors raised by staging operations.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to walk {}: {source}", path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to write archive {}: {source}", path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Result type for staging operations.
pub type Result<T> = std::result::Result<T, StagingError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StagingError + '_ {
    move |source| StagingError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Check whether a file or directory exists.
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Create a directory and all missing parents; no-op when it exists.
pub fn make_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(io_err(path))?;
    debug!(path = %path.display(), "Ensured directory");
    Ok(())
}

/// Copy a single file.
///
/// Returns `false` without touching anything when `to` already exists or
/// `from` is missing.
pub fn copy_file(from: &Path, to: &Path) -> Result<bool> {
    if to.exists() || !from.exists() {
        debug!(
            from = %from.display(),
            to = %to.display(),
            "Skipping file copy"
        );
        return Ok(false);
    }

    let bytes = fs::copy(from, to).map_err(io_err(to))?;
    info!(from = %from.display(), to = %to.display(), bytes, "Copied file");
    Ok(true)
}

/// Deep-copy a directory tree.
///
/// Returns `false` without touching anything when `to` already exists or
/// `from` is missing.
pub fn copy_dir_recursively(from: &Path, to: &Path) -> Result<bool> {
    if to.exists() || !from.is_dir() {
        debug!(
            from = %from.display(),
            to = %to.display(),
            "Skipping directory copy"
        );
        return Ok(false);
    }

    let mut files = 0usize;
    for entry in WalkDir::new(from).sort_by_file_name() {
        let entry = entry.map_err(|source| StagingError::Walk {
            path: from.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(io_err(&target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(io_err(&target))?;
            files += 1;
        }
    }

    info!(from = %from.display(), to = %to.display(), files, "Copied directory");
    Ok(true)
}

/// Path of the archive [`zip_dir`] produces for `dir`.
pub fn zip_path(dir: &Path) -> PathBuf {
    let mut name = dir.as_os_str().to_os_string();
    name.push(".");
    name.push(ZIP_EXTENSION);
    PathBuf::from(name)
}

/// Remove a single file.
///
/// Returns `false` when there was nothing to remove.
pub fn remove_file(path: &Path) -> Result<bool> {
    if !path.is_file() {
        return Ok(false);
    }
    fs::remove_file(path).map_err(io_err(path))?;
    info!(path = %path.display(), "Removed file");
    Ok(true)
}

/// Archive a directory's contents into `<dir>.zip` next to it.
///
/// Entries are stored relative to `dir`, so the archive root holds the
/// directory's contents. Returns `false` without touching anything when
/// the archive already exists or `dir` does not exist.
pub fn zip_dir(dir: &Path) -> Result<bool> {
    let archive = zip_path(dir);
    if archive.exists() {
        debug!(path = %archive.display(), "Archive already exists");
        return Ok(false);
    }
    if !dir.is_dir() {
        warn!(path = %dir.display(), "Directory to archive does not exist");
        return Ok(false);
    }

    let partial = archive.with_extension("zip.partial");
    let entries = match write_archive(dir, &partial) {
        Ok(entries) => entries,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };
    fs::rename(&partial, &archive).map_err(io_err(&archive))?;

    info!(path = %archive.display(), files = entries, "Created archive");
    Ok(true)
}

/// Write the zip for `dir` to `target`. Returns the number of files stored.
fn write_archive(dir: &Path, target: &Path) -> Result<usize> {
    let file = File::create(target).map_err(io_err(target))?;
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let zip_err = |source| StagingError::Archive {
        path: target.to_path_buf(),
        source,
    };

    let mut entries = 0usize;
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| StagingError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let name = archive_name(relative);

        if entry.file_type().is_dir() {
            writer.add_directory(name, options).map_err(zip_err)?;
        } else {
            writer.start_file(name, options).map_err(zip_err)?;
            let mut source = File::open(entry.path()).map_err(io_err(entry.path()))?;
            io::copy(&mut source, &mut writer).map_err(io_err(target))?;
            entries += 1;
        }
    }

    writer.finish().map_err(zip_err)?;
    Ok(entries)
}

/// Zip entry names always use `/` separators.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
