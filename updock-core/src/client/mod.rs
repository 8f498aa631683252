//! Update client
//!
//! An [`UpdateSession`] pulls one version from an [`UpdateSource`] and applies
//! it to a local application directory:
//!
//! - Resolve the request (`LATEST` or an exact version) against the catalog
//! - Download the archive to a scratch file outside the application directory
//! - Extract it with full-replace semantics
//! - Record the installed version, only after extraction succeeded
//!
//! The installed-version record ([`InstalledRecord`]) lives outside the
//! application directory so the replace step can never wipe it.

mod record;
mod session;
mod source;

#[cfg(feature = "client")]
mod http;

pub use record::InstalledRecord;
pub use session::{SessionState, UpdateCheck, UpdateOutcome, UpdateSession};
pub use source::{AcceptAll, ArchiveVerifier, UpdateSource, VerifyError};

#[cfg(feature = "client")]
pub use http::HttpSource;
