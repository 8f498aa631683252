//! Error types with clear, actionable messages
//!
//! Host-side errors never carry filesystem paths in their display text; those
//! are logged where the error is raised and kept out of client responses.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while serving the catalog or a package
#[derive(Error, Debug)]
pub enum HostError {
    /// The package root itself could not be read
    #[error("Failed to read the version catalog")]
    CatalogRead {
        #[source]
        source: std::io::Error,
    },

    /// No catalog entry matches the request (or the catalog is empty)
    #[error("Version not found: {requested}")]
    VersionNotFound { requested: String },

    /// The requested version would resolve outside the package root
    #[error("Invalid version path: {requested}")]
    PathTraversal { requested: String },
}

impl HostError {
    /// Log security-relevant rejections under the `security` target
    pub fn log_if_security_relevant(&self) {
        if let HostError::PathTraversal { requested } = self {
            tracing::warn!(target: "security", "Rejected version path: {:?}", requested);
        }
    }
}

/// Errors raised while packing or unpacking archives
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Writing the archive failed (source directory unreadable, sink closed)
    #[error("Failed to write archive: {0}")]
    Write(#[source] std::io::Error),

    /// Archive is malformed, truncated, or could not be read
    #[error("Malformed or truncated archive: {0}")]
    Malformed(#[source] std::io::Error),

    /// Archive contains an entry that would land outside the target
    #[error("Archive entry escapes the target directory: {}", .0.display())]
    UnsafeEntry(PathBuf),

    /// Archive had no entries at all
    #[error("Archive contains no entries")]
    Empty,

    /// Filesystem failure while staging or swapping the extracted tree
    #[error("Failed to {action} {}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the installed-version record
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("Failed to read installed-version record from {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write installed-version record to {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by an update source (catalog fetch, archive download)
#[derive(Error, Debug)]
pub enum SourceError {
    /// The host could not be reached at all
    #[error("Update server unreachable: {0}")]
    Unreachable(String),

    /// The host does not have the requested version
    #[error("Version not available on server: {0}")]
    NotFound(String),

    /// The host refused the request (e.g. path containment rejection)
    #[error("Server rejected the request: {0}")]
    Rejected(String),

    /// Anything else that went wrong on the wire
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// Local write of the downloaded archive failed
    #[error("Failed to stage download at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{what} ({}) must be outside the application directory ({})", .path.display(), .app_dir.display())]
    InsideAppDir {
        what: &'static str,
        path: PathBuf,
        app_dir: PathBuf,
    },

    #[error("Could not determine config directory")]
    NoConfigDir,
}

/// Stage of an update session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Resolving,
    Downloading,
    Extracting,
    Committing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolving => "resolving",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::Committing => "committing",
        };
        f.write_str(name)
    }
}

/// Why an update session failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    #[error("no versions available on the server")]
    NoVersionsAvailable,

    #[error("server unreachable: {0}")]
    ServerUnreachable(String),

    #[error("version not found: {0}")]
    VersionNotFound(String),

    #[error("request rejected by server: {0}")]
    Rejected(String),

    #[error("transfer error: {0}")]
    TransferError(String),

    #[error("archive verification failed: {0}")]
    VerificationFailed(String),

    #[error("extraction error: {0}")]
    ExtractionError(String),

    #[error("persist error: {0}")]
    PersistError(String),
}

/// A failed update session: the stage it died in and why
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Update failed while {stage}: {cause}")]
pub struct UpdateError {
    pub stage: Stage,
    pub cause: FailureCause,
}

impl UpdateError {
    pub fn new(stage: Stage, cause: FailureCause) -> Self {
        Self { stage, cause }
    }

    /// True when the application directory was replaced but the record was not written
    pub fn is_applied_but_unrecorded(&self) -> bool {
        matches!(self.cause, FailureCause::PersistError(_))
    }

    /// True when restarting the whole session from scratch is reasonable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.cause,
            FailureCause::ServerUnreachable(_) | FailureCause::TransferError(_)
        )
    }
}

impl From<(Stage, SourceError)> for UpdateError {
    fn from((stage, err): (Stage, SourceError)) -> Self {
        let cause = match err {
            SourceError::Unreachable(msg) => FailureCause::ServerUnreachable(msg),
            SourceError::NotFound(msg) => FailureCause::VersionNotFound(msg),
            SourceError::Rejected(msg) => FailureCause::Rejected(msg),
            SourceError::Transfer(msg) => FailureCause::TransferError(msg),
            err @ SourceError::Io { .. } => FailureCause::TransferError(error_chain(&err)),
        };
        UpdateError::new(stage, cause)
    }
}

/// Render an error and its sources as one line
pub(crate) fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_error_names_stage() {
        let err = UpdateError::new(
            Stage::Extracting,
            FailureCause::ExtractionError("truncated".to_string()),
        );
        assert_eq!(
            err.to_string(),
            "Update failed while extracting: extraction error: truncated"
        );
        assert!(!err.is_retryable());
        assert!(!err.is_applied_but_unrecorded());
    }

    #[test]
    fn test_persist_error_is_distinct() {
        let err = UpdateError::new(
            Stage::Committing,
            FailureCause::PersistError("disk full".to_string()),
        );
        assert!(err.is_applied_but_unrecorded());
    }

    #[test]
    fn test_source_error_mapping() {
        let err: UpdateError =
            (Stage::Resolving, SourceError::Unreachable("refused".to_string())).into();
        assert_eq!(
            err.cause,
            FailureCause::ServerUnreachable("refused".to_string())
        );
        assert!(err.is_retryable());

        let err: UpdateError =
            (Stage::Downloading, SourceError::NotFound("9.9.9".to_string())).into();
        assert_eq!(err.cause, FailureCause::VersionNotFound("9.9.9".to_string()));
    }

    #[test]
    fn test_host_error_hides_paths() {
        let err = HostError::CatalogRead {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "/srv/secret/updates"),
        };
        assert!(!err.to_string().contains("/srv"));
    }
}
