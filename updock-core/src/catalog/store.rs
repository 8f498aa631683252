//! Version catalog built from the package root
//!
//! Every immediate subdirectory of the package root whose name is a valid
//! [`VersionId`] is a package. The catalog is recomputed from disk on every
//! call; there is no cache to invalidate.

use std::path::{Path, PathBuf};

use super::path::resolve_package_path;
use super::VersionId;
use crate::error::HostError;

/// Keyword that resolves to the newest catalog entry
pub const LATEST: &str = "LATEST";

/// An ordered set of versions, newest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    versions: Vec<VersionId>,
}

impl Catalog {
    /// Build a catalog from unordered identifiers
    pub fn from_unsorted(mut versions: Vec<VersionId>) -> Self {
        versions.sort_by(|a, b| b.cmp(a));
        Self { versions }
    }

    /// Newest version, if any
    pub fn latest(&self) -> Option<&VersionId> {
        self.versions.first()
    }

    pub fn versions(&self) -> &[VersionId] {
        &self.versions
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Version names in catalog order
    pub fn names(&self) -> Vec<String> {
        self.versions.iter().map(|v| v.to_string()).collect()
    }

    /// Resolve a requested version against this catalog
    ///
    /// Whitespace is stripped. `LATEST` (any case) maps to the newest entry;
    /// anything else must match an entry exactly, ignoring case. No prefix or
    /// range matching.
    pub fn resolve(&self, requested: &str) -> Result<&VersionId, HostError> {
        let wanted = requested.trim();

        let found = if wanted.eq_ignore_ascii_case(LATEST) {
            self.latest()
        } else {
            self.versions
                .iter()
                .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
        };

        found.ok_or_else(|| HostError::VersionNotFound {
            requested: wanted.to_string(),
        })
    }
}

/// Reads the catalog and resolves package directories under a root
#[derive(Debug, Clone)]
pub struct VersionStore {
    root: PathBuf,
}

impl VersionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List valid versions, newest first
    ///
    /// Fails only if the root itself cannot be read. Entries that are not
    /// directories, are not valid UTF-8, or do not match the version grammar
    /// are skipped.
    pub fn list_versions(&self) -> Result<Catalog, HostError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| {
            tracing::error!("Failed to read package root {}: {}", self.root.display(), source);
            HostError::CatalogRead { source }
        })?;

        let mut versions = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!("Skipping unreadable catalog entry: {}", e);
                    continue;
                }
            };

            if !entry.path().is_dir() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                tracing::debug!("Skipping non UTF-8 entry {:?}", entry.file_name());
                continue;
            };

            match VersionId::parse(&name) {
                Some(version) => versions.push(version),
                None => tracing::debug!("Skipping non-version directory '{}'", name),
            }
        }

        Ok(Catalog::from_unsorted(versions))
    }

    /// Resolve a requested version against a fresh catalog
    pub fn resolve(&self, requested: &str) -> Result<VersionId, HostError> {
        let catalog = self.list_versions()?;
        catalog.resolve(requested).cloned()
    }

    /// Absolute, containment-checked directory for a resolved version
    pub fn package_path(&self, version: &VersionId) -> Result<PathBuf, HostError> {
        resolve_package_path(&self.root, version.as_str())
    }
}
