//! Installed-version record
//!
//! A plain-text file holding exactly the identifier of the last successfully
//! applied version, with no trailing newline. It lives outside the managed
//! application directory so that full-replace extraction never touches it.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::RecordError;

/// Handle to the installed-version record file
#[derive(Debug, Clone)]
pub struct InstalledRecord {
    path: PathBuf,
}

impl InstalledRecord {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the installed version; `None` if nothing was ever recorded
    pub fn load(&self) -> Result<Option<String>, RecordError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let version = content.trim();
                if version.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(version.to_string()))
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RecordError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Atomically replace the record with `version`
    pub fn save(&self, version: &str) -> Result<(), RecordError> {
        let write_error = |source: std::io::Error| RecordError::Write {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(write_error)?;

        let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(write_error)?;
        temp.write_all(version.as_bytes()).map_err(write_error)?;
        temp.as_file().sync_all().map_err(write_error)?;
        temp.persist(&self.path)
            .map_err(|e| write_error(e.error))?;

        Ok(())
    }
}
