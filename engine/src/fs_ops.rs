//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Ensuring a directory exists
//! - Listing the regular files of a directory (one level deep)
//! - Moving a file, with a copy fallback across filesystems

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{RelayError, RelayResult};

/// Prefix reserved for in-flight downloads in the staging directory.
pub const PARTIAL_PREFIX: &str = ".partial-";

/// Create `path` (and missing parents) unless it already is a directory.
///
/// # Errors
/// Returns `RelayError::Storage` if the path exists but is not a directory, or
/// if it cannot be created.
pub fn ensure_dir_exists(path: &Path) -> RelayResult<()> {
    match fs::metadata(path) {
        Ok(metadata) => {
            if metadata.is_dir() {
                Ok(())
            } else {
                Err(RelayError::storage(
                    "ensure directory",
                    path,
                    io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        "path exists but is not a directory",
                    ),
                ))
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| RelayError::storage("create directory", path, e))
        }
        Err(e) => Err(RelayError::storage("ensure directory", path, e)),
    }
}

/// List the regular files directly inside `dir`, sorted by name.
///
/// Subdirectories, symlinks to directories and in-flight `.partial-` files
/// are skipped. Names that are not valid UTF-8 are skipped too, since they
/// can never have come from a listing.
///
/// # Errors
/// Returns `RelayError::Storage` if the directory cannot be read.
pub fn list_files(dir: &Path) -> RelayResult<Vec<(String, PathBuf)>> {
    let entries = fs::read_dir(dir).map_err(|e| RelayError::storage("read directory", dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| RelayError::storage("read directory", dir, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with(PARTIAL_PREFIX) {
            continue;
        }

        let path = entry.path();
        let metadata = fs::metadata(&path).map_err(|e| RelayError::storage("stat", &path, e))?;
        if metadata.is_file() {
            files.push((name, path));
        }
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Move `src` to `dst`, which must not exist yet.
///
/// Tries a rename first; when the two paths live on different filesystems
/// the file is copied (modification time preserved) and the source removed.
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            copy_file_with_metadata(src, dst)?;
            fs::remove_file(src)
        }
        Err(e) => Err(e),
    }
}

/// Copy a file from source to destination with modification time preserved.
///
/// The data goes to a `.partial-` temporary next to `dst` first and only
/// takes the final name once it is complete and synced, so `dst` is either
/// absent or whole. An existing `dst` is never replaced.
///
/// Returns the number of bytes copied.
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> io::Result<u64> {
    let mut src_file = fs::File::open(src)?;
    let src_mtime = src_file.metadata()?.modified().ok();

    let dir = match dst.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::Builder::new()
        .prefix(PARTIAL_PREFIX)
        .tempfile_in(dir)?;
    let bytes_copied = io::copy(&mut src_file, temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    if let Some(mtime) = src_mtime {
        filetime::set_file_mtime(temp.path(), filetime::FileTime::from_system_time(mtime))?;
    }

    temp.persist_noclobber(dst).map_err(|e| e.error)?;
    Ok(bytes_copied)
}
