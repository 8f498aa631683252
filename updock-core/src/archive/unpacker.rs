//! Archive extraction with full-replace semantics
//!
//! Entries are unpacked into a staging directory next to the target, then
//! swapped into place with renames. The previous contents are never merged
//! with the new ones, and a failure at any point before the swap leaves the
//! target untouched.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use crate::error::ArchiveError;

/// Prefix of the staging directory created next to the target
const STAGING_PREFIX: &str = ".updock-staging-";

/// Prefix of the directory holding previous contents during the swap
const BACKUP_PREFIX: &str = ".updock-previous-";

/// Extract a tar.gz archive file into `target`, replacing its contents
pub fn extract_file(archive: &Path, target: &Path) -> Result<usize, ArchiveError> {
    let file = File::open(archive).map_err(|source| ArchiveError::Filesystem {
        action: "open archive",
        path: archive.to_path_buf(),
        source,
    })?;
    extract(BufReader::new(file), target)
}

/// Extract a tar.gz stream into `target`, replacing its contents
///
/// The first path component of every entry (the version-named wrapper
/// directory) is stripped. Returns the number of archive entries read.
pub fn extract<R: Read>(reader: R, target: &Path) -> Result<usize, ArchiveError> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    fs::create_dir_all(&parent).map_err(|source| ArchiveError::Filesystem {
        action: "create parent directory",
        path: parent.clone(),
        source,
    })?;

    // Staging lives on the same filesystem as the target so the swap is a rename
    let staging = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(&parent)
        .map_err(|source| ArchiveError::Filesystem {
            action: "create staging directory in",
            path: parent.clone(),
            source,
        })?;

    let tree = staging.path().join("tree");
    fs::create_dir(&tree).map_err(|source| ArchiveError::Filesystem {
        action: "create staging tree",
        path: tree.clone(),
        source,
    })?;

    let unpacked = unpack_stripped(reader, &tree)?;
    if unpacked.entries == 0 {
        return Err(ArchiveError::Empty);
    }

    // Directory modes are applied only once every file is in place
    let swapped = apply_dir_modes(&unpacked.dir_modes)
        .and_then(|()| swap_into_place(&tree, target, &parent));
    if let Err(e) = swapped {
        relax_permissions(&tree);
        return Err(e);
    }

    tracing::debug!("Extracted {} entries into {}", unpacked.entries, target.display());
    Ok(unpacked.entries)
}

/// Result of unpacking into the staging tree
struct Unpacked {
    entries: usize,
    /// Directories created from archive entries with their archived modes
    dir_modes: Vec<(PathBuf, u32)>,
}

/// Unpack every entry below `dest`, dropping the first path component
fn unpack_stripped<R: Read>(reader: R, dest: &Path) -> Result<Unpacked, ArchiveError> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_overwrite(true);

    let canonical_dest = dest
        .canonicalize()
        .map_err(|source| ArchiveError::Filesystem {
            action: "canonicalize",
            path: dest.to_path_buf(),
            source,
        })?;

    let mut count = 0;
    let mut dir_modes = Vec::new();
    for entry in archive.entries().map_err(ArchiveError::Malformed)? {
        let mut entry = entry.map_err(ArchiveError::Malformed)?;
        let path = entry.path().map_err(ArchiveError::Malformed)?.into_owned();
        count += 1;

        if entry.header().entry_type().is_hard_link() {
            return Err(ArchiveError::UnsafeEntry(path));
        }

        let Some(relative) = strip_wrapper(&path)? else {
            continue;
        };

        let out = dest.join(&relative);
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent).map_err(|source| ArchiveError::Filesystem {
                action: "create directory",
                path: relative.clone(),
                source,
            })?;

            // A symlink unpacked earlier must not redirect later entries
            let canonical_parent =
                parent
                    .canonicalize()
                    .map_err(|source| ArchiveError::Filesystem {
                        action: "canonicalize",
                        path: relative.clone(),
                        source,
                    })?;
            if !canonical_parent.starts_with(&canonical_dest) {
                return Err(ArchiveError::UnsafeEntry(path));
            }
        }

        if entry.header().entry_type().is_dir() {
            fs::create_dir_all(&out).map_err(|source| ArchiveError::Filesystem {
                action: "create directory",
                path: relative.clone(),
                source,
            })?;
            // an earlier symlink entry must not make the mode land outside the tree
            let is_real_dir = fs::symlink_metadata(&out)
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if !is_real_dir {
                return Err(ArchiveError::UnsafeEntry(path));
            }
            let mode = entry.header().mode().map_err(ArchiveError::Malformed)?;
            dir_modes.push((out, mode));
            continue;
        }

        entry.unpack(&out).map_err(|source| classify_unpack_error(source, &relative))?;
    }

    Ok(Unpacked {
        entries: count,
        dir_modes,
    })
}

/// Apply archived directory modes, deepest directories first
#[cfg(unix)]
fn apply_dir_modes(dir_modes: &[(PathBuf, u32)]) -> Result<(), ArchiveError> {
    use std::os::unix::fs::PermissionsExt;

    let mut ordered: Vec<&(PathBuf, u32)> = dir_modes.iter().collect();
    ordered.sort_by_key(|(dir, _)| std::cmp::Reverse(dir.components().count()));

    for (dir, mode) in ordered {
        fs::set_permissions(dir, fs::Permissions::from_mode(mode & 0o7777)).map_err(|source| {
            ArchiveError::Filesystem {
                action: "set permissions on",
                path: dir.clone(),
                source,
            }
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_dir_modes(_dir_modes: &[(PathBuf, u32)]) -> Result<(), ArchiveError> {
    Ok(())
}

/// Make every directory under `root` owner-writable so the tree can be removed
///
/// Best effort; whatever stays locked is reported by the removal that follows.
#[cfg(unix)]
fn relax_permissions(root: &Path) {
    use std::os::unix::fs::PermissionsExt;

    let Ok(meta) = fs::symlink_metadata(root) else {
        return;
    };
    if !meta.is_dir() {
        return;
    }

    let mode = meta.permissions().mode();
    if mode & 0o700 != 0o700 {
        let _ = fs::set_permissions(root, fs::Permissions::from_mode(mode | 0o700));
    }

    if let Ok(children) = fs::read_dir(root) {
        for child in children.flatten() {
            relax_permissions(&child.path());
        }
    }
}

#[cfg(not(unix))]
fn relax_permissions(_root: &Path) {}

/// Drop the wrapper component; `None` for the wrapper entry itself
fn strip_wrapper(path: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    let mut components = path.components();

    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => return Err(ArchiveError::UnsafeEntry(path.to_path_buf())),
    }

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            _ => return Err(ArchiveError::UnsafeEntry(path.to_path_buf())),
        }
    }

    if relative.as_os_str().is_empty() {
        Ok(None)
    } else {
        Ok(Some(relative))
    }
}

/// Truncated or corrupt data surfaces from `unpack` as an I/O error too
fn classify_unpack_error(source: io::Error, relative: &Path) -> ArchiveError {
    match source.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            ArchiveError::Malformed(source)
        }
        _ => ArchiveError::Filesystem {
            action: "unpack",
            path: relative.to_path_buf(),
            source,
        },
    }
}

/// Replace `target` with `staged` using renames within `parent`
fn swap_into_place(staged: &Path, target: &Path, parent: &Path) -> Result<(), ArchiveError> {
    let backup = if fs::symlink_metadata(target).is_ok() {
        let backup = parent.join(format!("{BACKUP_PREFIX}{}", uuid::Uuid::new_v4()));
        fs::rename(target, &backup).map_err(|source| ArchiveError::Filesystem {
            action: "move aside previous contents of",
            path: target.to_path_buf(),
            source,
        })?;
        Some(backup)
    } else {
        None
    };

    if let Err(source) = fs::rename(staged, target) {
        if let Some(backup) = &backup {
            if let Err(e) = fs::rename(backup, target) {
                tracing::error!(
                    "Failed to restore previous contents from {} to {}: {}",
                    backup.display(),
                    target.display(),
                    e
                );
            }
        }
        return Err(ArchiveError::Filesystem {
            action: "move extracted tree into",
            path: target.to_path_buf(),
            source,
        });
    }

    if let Some(backup) = backup {
        let removed = if backup.is_dir() {
            relax_permissions(&backup);
            fs::remove_dir_all(&backup)
        } else {
            fs::remove_file(&backup)
        };
        if let Err(e) = removed {
            tracing::warn!(
                "Failed to remove previous contents at {}: {}",
                backup.display(),
                e
            );
        }
    }

    Ok(())
}
