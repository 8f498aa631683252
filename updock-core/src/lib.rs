//! updock core library
//!
//! Hosts versioned packages as directories, streams them as gzip tarballs,
//! and applies them atomically on the client side.

pub mod archive;
pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;

#[cfg(feature = "host")]
pub mod host;

pub use error::{
    ArchiveError, ConfigError, FailureCause, HostError, RecordError, SourceError, Stage,
    UpdateError,
};
