//! Version catalog - discovery, ordering and resolution of packages
//!
//! # Overview
//!
//! The host keeps one directory per version under a package root:
//!
//! ```text
//! updates/
//!     ├── 1.0.0/        ← package contents for 1.0.0
//!     ├── 2.1.0/        ← newest, returned first and for LATEST
//!     └── 2.2.0-rc.1/   ← not a version, ignored
//! ```
//!
//! [`VersionStore`] turns that listing into a [`Catalog`] ordered newest
//! first, resolves requests against it, and hands out containment-checked
//! package paths.

mod path;
mod store;
mod version;

pub use path::{ensure_single_component, resolve_package_path};
pub use store::{Catalog, VersionStore, LATEST};
pub use version::VersionId;
