//! Package path containment
//!
//! A requested version must name exactly one directory directly below the
//! package root. This is checked twice: lexically on the raw request, before
//! anything touches the filesystem, and again after canonicalization so that
//! symlinks cannot point a package outside the root.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use crate::error::HostError;

/// Reject requests that are not a single plain path component
///
/// Runs before catalog resolution so traversal attempts are always answered
/// with a containment error rather than "not found".
pub fn ensure_single_component(requested: &str) -> Result<(), HostError> {
    let trimmed = requested.trim();
    let reject = || HostError::PathTraversal {
        requested: trimmed.to_string(),
    };

    if trimmed.is_empty() || trimmed.contains(['/', '\\', '\0']) {
        return Err(reject());
    }

    let mut components = Path::new(trimmed).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(reject()),
    }
}

/// Resolve `root/version` to an absolute path that is a strict descendant of `root`
pub fn resolve_package_path(root: &Path, version: &str) -> Result<PathBuf, HostError> {
    ensure_single_component(version)?;

    let canonical_root = root.canonicalize().map_err(|source| {
        tracing::error!("Failed to canonicalize package root {}: {}", root.display(), source);
        HostError::CatalogRead { source }
    })?;

    let candidate = canonical_root.join(version.trim());
    let canonical = match candidate.canonicalize() {
        Ok(path) => path,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(HostError::VersionNotFound {
                requested: version.trim().to_string(),
            });
        }
        Err(source) => {
            tracing::error!("Failed to canonicalize {}: {}", candidate.display(), source);
            return Err(HostError::CatalogRead { source });
        }
    };

    if canonical == canonical_root || !canonical.starts_with(&canonical_root) {
        tracing::warn!(
            target: "security",
            "Package path {} resolves outside root {}",
            candidate.display(),
            canonical_root.display()
        );
        return Err(HostError::PathTraversal {
            requested: version.trim().to_string(),
        });
    }

    if !canonical.is_dir() {
        return Err(HostError::VersionNotFound {
            requested: version.trim().to_string(),
        });
    }

    Ok(canonical)
}
