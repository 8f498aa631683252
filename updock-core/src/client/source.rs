//! Seams of the update session: where archives come from and how they are vetted

use async_trait::async_trait;
use std::path::Path;

use crate::error::SourceError;

/// Where an update session gets its catalog and archives from
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Version names offered by the host, newest first
    async fn fetch_catalog(&self) -> Result<Vec<String>, SourceError>;

    /// Download the archive for `requested` (passed through verbatim,
    /// including `LATEST`) into `dest`
    ///
    /// Returns the version the host says it served, when it says so. On
    /// success `dest` holds the complete archive and has been synced to disk.
    async fn download(&self, requested: &str, dest: &Path) -> Result<Option<String>, SourceError>;
}

/// Error type returned by archive verifiers
pub type VerifyError = Box<dyn std::error::Error + Send + Sync>;

/// Check run on a fully downloaded archive before anything is extracted
pub trait ArchiveVerifier: Send + Sync {
    fn verify(&self, version: &str, archive: &Path) -> Result<(), VerifyError>;
}

/// Verifier that accepts every archive
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ArchiveVerifier for AcceptAll {
    fn verify(&self, _version: &str, _archive: &Path) -> Result<(), VerifyError> {
        Ok(())
    }
}
