//! Thin filesystem inspection layer used by the classifier, deduplicator and
//! allocator.
//!
//! Everything here is read-only except [`move_file`], which the allocator uses
//! to place artifacts. Walks are iterative and skip symlinks; per-entry read
//! failures are logged and skipped so one bad entry cannot abort a whole pass.

use std::{
    fs,
    path::{Path, PathBuf},
    time::SystemTime,
};

use thiserror::Error;
use tracing::warn;

/// Errors surfaced by filesystem inspection.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("Path not found: {0}")]
    NotFound(PathBuf),
    #[error("Access denied: {0}")]
    AccessDenied(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FsError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => FsError::AccessDenied(path.to_path_buf()),
            _ => FsError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// One immediate child of a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEntry {
    pub name: String,
    pub is_dir: bool,
}

/// List the immediate children of a directory, names only, no recursion.
///
/// Entries whose names are not valid UTF-8 or whose type cannot be read are
/// skipped with a warning.
pub fn list_children(path: &Path) -> Result<Vec<ChildEntry>, FsError> {
    let entries = fs::read_dir(path).map_err(|source| FsError::from_io(path, source))?;
    let mut children = Vec::new();
    for entry_result in entries {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %path.display(), error = %err, "Failed to read directory entry");
                continue;
            }
        };
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "Failed to read file type");
                continue;
            }
        };
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            warn!(path = %entry.path().display(), "Skipping non-UTF-8 entry name");
            continue;
        };
        children.push(ChildEntry {
            name,
            is_dir: file_type.is_dir(),
        });
    }
    Ok(children)
}

/// Total size in bytes of all regular files under `path`.
///
/// A plain file reports its own length. Symlinks are not followed and
/// unreadable subdirectories contribute nothing.
pub fn tree_size_bytes(path: &Path) -> Result<u64, FsError> {
    let meta = fs::symlink_metadata(path).map_err(|source| FsError::from_io(path, source))?;
    if meta.is_file() {
        return Ok(meta.len());
    }
    let mut total = 0u64;
    let mut stack = vec![path.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Failed to read directory while sizing");
                continue;
            }
        };
        for entry_result in entries {
            let Ok(entry) = entry_result else { continue };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file()
                && let Ok(meta) = entry.metadata()
            {
                total = total.saturating_add(meta.len());
            }
        }
    }
    Ok(total)
}

/// Modification time of a file.
pub fn mtime(path: &Path) -> Result<SystemTime, FsError> {
    let meta = fs::metadata(path).map_err(|source| FsError::from_io(path, source))?;
    meta.modified().map_err(|source| FsError::from_io(path, source))
}

/// Move a file into place, falling back to copy+remove across filesystems.
pub fn move_file(src: &Path, dst: &Path) -> Result<(), FsError> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            // EXDEV and friends; retry as a copy.
            fs::copy(src, dst).map_err(|source| {
                warn!(
                    src = %src.display(),
                    dst = %dst.display(),
                    error = %rename_err,
                    "Rename failed and copy fallback also failed"
                );
                FsError::from_io(dst, source)
            })?;
            fs::remove_file(src).map_err(|source| {
                // The copy landed but the source is stuck; take the copy
                // back out so the destination holds no unaccounted bytes.
                let _ = fs::remove_file(dst);
                FsError::from_io(src, source)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn list_children_reports_names_and_kinds() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("file.txt"), b"x").unwrap();

        let mut children = list_children(dir.path()).unwrap();
        children.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            children,
            vec![
                ChildEntry {
                    name: "file.txt".into(),
                    is_dir: false
                },
                ChildEntry {
                    name: "sub".into(),
                    is_dir: true
                },
            ]
        );
    }

    #[test]
    fn list_children_maps_missing_dir_to_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            list_children(&missing),
            Err(FsError::NotFound(path)) if path == missing
        ));
    }

    #[test]
    fn tree_size_sums_nested_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.bin"), vec![0u8; 10]).unwrap();
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("b.bin"), vec![0u8; 32]).unwrap();

        assert_eq!(tree_size_bytes(dir.path()).unwrap(), 42);
    }

    #[test]
    fn tree_size_of_plain_file_is_its_length() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.bin");
        fs::write(&file, vec![0u8; 7]).unwrap();
        assert_eq!(tree_size_bytes(&file).unwrap(), 7);
    }

    #[test]
    fn mtime_reflects_set_modification_time() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.bin");
        fs::write(&file, b"x").unwrap();
        let when = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(when)
            .unwrap();

        assert_eq!(mtime(&file).unwrap(), when);
        assert!(matches!(
            mtime(&dir.path().join("gone")),
            Err(FsError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failed_source_removal_takes_the_copy_back_out() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let locked = dir.path().join("locked");
        fs::create_dir(&locked).unwrap();
        let src = locked.join("src.bin");
        fs::write(&src, b"payload").unwrap();
        let dst = dir.path().join("dst.bin");

        // Write-protecting the parent makes both the rename and the source
        // removal fail while the copy still succeeds.
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::write(locked.join("writable_check"), b"").is_ok() {
            // Permission bits are not enforced for this user; the fallback
            // cannot be provoked here.
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = move_file(&src, &dst);
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(FsError::AccessDenied(_))));
        assert!(src.exists());
        assert!(!dst.exists(), "destination copy must not survive the error");
    }

    #[test]
    fn move_file_relocates_contents() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src.bin");
        let dst = dir.path().join("dst.bin");
        fs::write(&src, b"payload").unwrap();

        move_file(&src, &dst).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"payload");
    }
}
