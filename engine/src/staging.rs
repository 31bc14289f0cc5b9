//! Local staging store.
//!
//! Downloads land here before relocation. Every write goes to a hidden
//! `.partial-*` file in the staging directory and is renamed to its final name
//! only once the stream completed and the data was synced, so a name visible
//! in staging always refers to a complete file.

use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{RelayError, RelayResult};
use crate::fs_ops::{self, PARTIAL_PREFIX};

/// A fully written file in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub name: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Directory-backed staging area keyed by file name.
#[derive(Debug, Clone)]
pub struct StagingStore {
    root: PathBuf,
}

impl StagingStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StagingStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the staging directory if it is missing. Idempotent.
    pub fn ensure_exists(&self) -> RelayResult<()> {
        fs_ops::ensure_dir_exists(&self.root)
    }

    /// Stage `filename` from whatever `fill` writes.
    ///
    /// `fill` receives a buffered writer and returns the byte count it wrote.
    /// If `fill` or any filesystem step fails, the temporary file is removed
    /// and nothing appears under `filename`. A stale staged file with the same
    /// name is replaced.
    pub fn write_with<F>(&self, filename: &str, fill: F) -> RelayResult<StagedFile>
    where
        F: FnOnce(&mut dyn Write) -> RelayResult<u64>,
    {
        validate_file_name(filename)?;
        let final_path = self.root.join(filename);

        let temp = tempfile::Builder::new()
            .prefix(PARTIAL_PREFIX)
            .tempfile_in(&self.root)
            .map_err(|e| RelayError::storage("create temporary file", &self.root, e))?;

        let bytes = {
            let mut writer = BufWriter::new(temp.as_file());
            let bytes = fill(&mut writer)?;
            writer
                .flush()
                .map_err(|e| RelayError::storage("write", temp.path(), e))?;
            bytes
        };
        temp.as_file()
            .sync_all()
            .map_err(|e| RelayError::storage("sync", temp.path(), e))?;

        temp.persist(&final_path)
            .map_err(|e| RelayError::storage("promote staged file", &final_path, e.error))?;

        Ok(StagedFile {
            name: filename.to_string(),
            path: final_path,
            bytes,
        })
    }

    /// Completed files currently in staging, sorted by name.
    pub fn staged_files(&self) -> RelayResult<Vec<StagedFile>> {
        fs_ops::list_files(&self.root)?
            .into_iter()
            .map(|(name, path)| {
                let bytes = fs::metadata(&path)
                    .map_err(|e| RelayError::storage("stat", &path, e))?
                    .len();
                Ok(StagedFile { name, path, bytes })
            })
            .collect()
    }
}

/// Reject remote names that would escape the staging directory or clash with
/// in-flight temporaries.
pub fn validate_file_name(name: &str) -> RelayResult<()> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name == "." || name == ".." {
        Some("relative directory reference")
    } else if name.contains(['/', '\\', '\0']) {
        Some("contains a path separator or NUL")
    } else if name.starts_with(PARTIAL_PREFIX) {
        Some("uses the reserved partial-download prefix")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(RelayError::InvalidFileName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .expect("Failed to read dir")
            .map(|e| e.expect("Failed to read entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_ensure_exists_creates_directory() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = StagingStore::new(temp_dir.path().join("backup_directory"));

        store.ensure_exists().expect("Failed to ensure staging");
        store.ensure_exists().expect("Second ensure should succeed");
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_ensure_exists_fails_when_file_occupies_name() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let root = temp_dir.path().join("backup_directory");
        fs::write(&root, "oops").expect("Failed to write file");

        let store = StagingStore::new(&root);
        assert!(matches!(store.ensure_exists(), Err(RelayError::Storage { .. })));
    }

    #[test]
    fn test_write_with_promotes_complete_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = StagingStore::new(temp_dir.path());

        let staged = store
            .write_with("a.csv", |sink| {
                sink.write_all(b"id,value\n1,2\n")
                    .map_err(|e| RelayError::storage("write", "a.csv", e))?;
                Ok(13)
            })
            .expect("Failed to stage");

        assert_eq!(staged.bytes, 13);
        assert_eq!(fs::read(&staged.path).expect("Failed to read"), b"id,value\n1,2\n");
        assert_eq!(entries(temp_dir.path()), vec!["a.csv"]);
    }

    #[test]
    fn test_failed_write_leaves_nothing_behind() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = StagingStore::new(temp_dir.path());

        let result = store.write_with("a.csv", |sink| {
            sink.write_all(b"half of the")
                .map_err(|e| RelayError::storage("write", "a.csv", e))?;
            Err(RelayError::Transfer {
                file: "a.csv".to_string(),
                detail: "connection reset".to_string(),
            })
        });

        assert!(matches!(result, Err(RelayError::Transfer { .. })));
        assert!(entries(temp_dir.path()).is_empty(), "no partial or temp file may remain");
    }

    #[test]
    fn test_failed_rewrite_keeps_previous_copy() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = StagingStore::new(temp_dir.path());
        fs::write(temp_dir.path().join("a.csv"), "complete").expect("Failed to write");

        let _ = store.write_with("a.csv", |_| {
            Err(RelayError::Transfer {
                file: "a.csv".to_string(),
                detail: "reset".to_string(),
            })
        });

        let content = fs::read_to_string(temp_dir.path().join("a.csv")).expect("Failed to read");
        assert_eq!(content, "complete");
    }

    #[test]
    fn test_rejects_unsafe_names() {
        for name in ["", ".", "..", "../etc/passwd", "sub/a.csv", "a\\b", ".partial-abc"] {
            assert!(
                matches!(validate_file_name(name), Err(RelayError::InvalidFileName { .. })),
                "{:?} should be rejected",
                name
            );
        }
        validate_file_name("report 2024-01-01.csv").expect("plain names are fine");
        validate_file_name(".hidden").expect("dot files are fine");
    }

    #[test]
    fn test_staged_files_lists_completed_entries() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = StagingStore::new(temp_dir.path());
        fs::write(temp_dir.path().join("b.csv"), "bb").expect("Failed to write");
        fs::write(temp_dir.path().join(".partial-123"), "x").expect("Failed to write");

        let staged = store.staged_files().expect("Failed to list");
        assert_eq!(staged.len(), 1);
        assert_eq!(staged[0].name, "b.csv");
        assert_eq!(staged[0].bytes, 2);
    }
}
