//! Relocation of staged files into the destination directory.
//!
//! Relocation is best effort: every staged file is moved independently and a
//! failure on one file is recorded without stopping the others. A name that
//! already exists in the destination is never overwritten; that file stays in
//! staging and the collision is reported.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{RelayError, RelayResult};
use crate::fs_ops;
use crate::staging::StagingStore;

/// Outcome of moving one staged file.
#[derive(Debug)]
pub struct RelocationResult {
    pub name: String,
    pub destination: PathBuf,
    pub result: RelayResult<()>,
}

/// Move every completed file in `staging` into `dest_dir`.
///
/// `observe` is called before each move with the file name, so callers can
/// report the attempt. The destination directory is ensured first.
///
/// # Errors
/// Returns `RelayError::Storage` only when the destination cannot be ensured
/// or the staging directory cannot be read; per-file failures are in the
/// returned results.
pub fn relocate_all<F>(
    staging: &StagingStore,
    dest_dir: &Path,
    mut observe: F,
) -> RelayResult<Vec<RelocationResult>>
where
    F: FnMut(&str),
{
    fs_ops::ensure_dir_exists(dest_dir)?;
    let staged = staging.staged_files()?;

    let mut results = Vec::with_capacity(staged.len());
    for file in staged {
        observe(&file.name);
        let destination = dest_dir.join(&file.name);
        let result = relocate_one(&file.name, &file.path, &destination);
        results.push(RelocationResult {
            name: file.name,
            destination,
            result,
        });
    }
    Ok(results)
}

fn relocate_one(name: &str, src: &Path, destination: &Path) -> RelayResult<()> {
    match fs::symlink_metadata(destination) {
        Ok(_) => {
            return Err(RelayError::Collision {
                file: name.to_string(),
                destination: destination.to_path_buf(),
            })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(RelayError::Relocation {
                file: name.to_string(),
                destination: destination.to_path_buf(),
                source: e,
            })
        }
    }

    fs_ops::move_file(src, destination).map_err(|e| {
        if e.kind() == io::ErrorKind::AlreadyExists {
            RelayError::Collision {
                file: name.to_string(),
                destination: destination.to_path_buf(),
            }
        } else {
            RelayError::Relocation {
                file: name.to_string(),
                destination: destination.to_path_buf(),
                source: e,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let staging = temp_dir.path().join("backup_directory");
        let shared = temp_dir.path().join("nfs_shared_directory");
        fs::create_dir(&staging).expect("Failed to create staging");
        (temp_dir, staging, shared)
    }

    #[test]
    fn test_relocates_every_staged_file() {
        let (_temp, staging, shared) = setup();
        fs::write(staging.join("a.csv"), "a").expect("Failed to write a.csv");
        fs::write(staging.join("b.csv"), "b").expect("Failed to write b.csv");

        let mut seen = Vec::new();
        let results =
            relocate_all(&StagingStore::new(&staging), &shared, |name| seen.push(name.to_string())).expect("Failed to relocate");

        assert_eq!(seen, vec!["a.csv", "b.csv"]);
        assert!(results.iter().all(|r| r.result.is_ok()));
        assert_eq!(fs::read_to_string(shared.join("a.csv")).expect("Failed to read"), "a");
        assert_eq!(fs::read_to_string(shared.join("b.csv")).expect("Failed to read"), "b");
        assert_eq!(fs::read_dir(&staging).expect("Failed to read").count(), 0);
    }

    #[test]
    fn test_collision_keeps_both_copies() {
        let (_temp, staging, shared) = setup();
        fs::create_dir(&shared).expect("Failed to create shared");
        fs::write(staging.join("a.csv"), "new").expect("Failed to write staged");
        fs::write(staging.join("b.csv"), "b").expect("Failed to write staged");
        fs::write(shared.join("a.csv"), "old").expect("Failed to write existing");

        let results = relocate_all(&StagingStore::new(&staging), &shared, |_| {}).expect("Failed to relocate");

        let a = results.iter().find(|r| r.name == "a.csv").expect("a.csv result");
        assert!(matches!(a.result, Err(RelayError::Collision { .. })));
        let b = results.iter().find(|r| r.name == "b.csv").expect("b.csv result");
        assert!(b.result.is_ok(), "collision must not stop other moves");

        assert_eq!(fs::read_to_string(shared.join("a.csv")).expect("Failed to read"), "old");
        assert_eq!(fs::read_to_string(staging.join("a.csv")).expect("Failed to read"), "new");
    }

    #[test]
    fn test_empty_staging_moves_nothing() {
        let (_temp, staging, shared) = setup();

        let results = relocate_all(&StagingStore::new(&staging), &shared, |_| {}).expect("Failed to relocate");
        assert!(results.is_empty());
        assert!(shared.is_dir(), "destination is ensured even with nothing to move");
    }

    #[test]
    fn test_unusable_destination_is_an_error() {
        let (temp, staging, _) = setup();
        let blocked = temp.path().join("blocked");
        fs::write(&blocked, "file in the way").expect("Failed to write");
        fs::write(staging.join("a.csv"), "a").expect("Failed to write");

        let result = relocate_all(&StagingStore::new(&staging), &blocked, |_| {});
        assert!(matches!(result, Err(RelayError::Storage { .. })));
        assert!(staging.join("a.csv").exists());
    }

    #[test]
    fn test_skips_directories_and_partials() {
        let (_temp, staging, shared) = setup();
        fs::create_dir(staging.join("sub")).expect("Failed to create subdir");
        fs::write(staging.join(".partial-1"), "x").expect("Failed to write partial");

        let results = relocate_all(&StagingStore::new(&staging), &shared, |_| {}).expect("Failed to relocate");
        assert!(results.is_empty());
        assert!(staging.join("sub").is_dir());
    }
}
