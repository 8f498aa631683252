//! Wire shapes of the host HTTP surface
//!
//! These are the JSON bodies exchanged between host and client. Internally
//! both sides work with typed results (`Catalog`, `HostError`); conversion to
//! and from these shapes happens only at the HTTP boundary.

use serde::{Deserialize, Serialize};

/// Query key naming the requested version on `/updates`
pub const VERSION_QUERY_KEY: &str = "version";

/// Media type of archive downloads
pub const ARCHIVE_CONTENT_TYPE: &str = "application/gzip";

/// File suffix of archive downloads
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// `GET /versions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionsResponse {
    /// Newest first
    pub versions: Vec<String>,
    pub latest: Option<String>,
}

/// `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339
    pub timestamp: String,
    pub versions: Vec<String>,
}

/// Body of every non-2xx JSON response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// `Content-Disposition` value for an archive of `version`
pub fn attachment_header(version: &str) -> String {
    format!("attachment; filename=\"{version}{ARCHIVE_SUFFIX}\"")
}

/// Version named by an archive `Content-Disposition` header
///
/// Returns `None` unless the filename is `<version>.tar.gz` with a valid
/// version identifier.
pub fn version_from_attachment(header: &str) -> Option<String> {
    let (_, rest) = header.split_once("filename=")?;
    let filename = rest.trim().trim_start_matches('"');
    let filename = filename.split(['"', ';']).next()?.trim();
    let version = filename.strip_suffix(ARCHIVE_SUFFIX)?;

    crate::catalog::VersionId::parse(version).map(|v| v.to_string())
}
