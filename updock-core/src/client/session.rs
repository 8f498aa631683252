//! Update session - one end-to-end update attempt
//!
//! ```text
//! Idle → Resolving → Downloading → Extracting → Committing → Done
//!            │            │             │             │
//!            └────────────┴─────────────┴─────────────┴──→ Failed(stage, cause)
//! ```
//!
//! Stages never overlap: the archive is fully on disk (and verified) before
//! extraction starts, and extraction has fully succeeded before the
//! installed-version record is touched.

use std::path::{Path, PathBuf};

use super::{AcceptAll, ArchiveVerifier, InstalledRecord, UpdateSource};
use crate::archive;
use crate::catalog::LATEST;
use crate::error::{error_chain, FailureCause, SourceError, Stage, UpdateError};

/// Where a session currently is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Resolving,
    Downloading,
    Extracting,
    Committing,
    Done,
    Failed(UpdateError),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed(_))
    }
}

/// Result of a successful update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Version now installed and recorded
    pub version: String,
    /// Version recorded before this session, if any
    pub previous: Option<String>,
    /// Number of archive entries extracted
    pub entries: usize,
}

/// Result of a read-only update check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    /// First catalog entry on the host
    pub latest: String,
    /// Installed-version record, if present
    pub installed: Option<String>,
    /// `installed != latest`, compared as plain strings
    pub update_available: bool,
}

/// Drives one update attempt against a local application directory
pub struct UpdateSession<S> {
    source: S,
    app_dir: PathBuf,
    record: InstalledRecord,
    scratch_dir: PathBuf,
    verifier: Box<dyn ArchiveVerifier>,
    state: SessionState,
    history: Vec<SessionState>,
}

impl<S: UpdateSource> UpdateSession<S> {
    pub fn new(
        source: S,
        app_dir: impl Into<PathBuf>,
        record: InstalledRecord,
        scratch_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            app_dir: app_dir.into(),
            record,
            scratch_dir: scratch_dir.into(),
            verifier: Box::new(AcceptAll),
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        }
    }

    /// Replace the archive verifier (defaults to [`AcceptAll`])
    pub fn with_verifier(mut self, verifier: impl ArchiveVerifier + 'static) -> Self {
        self.verifier = Box::new(verifier);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Every state entered during the last `update` call, in order
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    pub fn record(&self) -> &InstalledRecord {
        &self.record
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    /// Compare the host's newest version with the installed record
    ///
    /// This is plain string inequality, not a numeric comparison: a record of
    /// `"10.0.0"` against a catalog head of `"2.0.0"` still reports an update.
    pub async fn check_for_update(&self) -> Result<UpdateCheck, UpdateError> {
        let catalog = self
            .source
            .fetch_catalog()
            .await
            .map_err(|e| UpdateError::from((Stage::Resolving, e)))?;

        let latest = catalog
            .into_iter()
            .next()
            .ok_or_else(|| UpdateError::new(Stage::Resolving, FailureCause::NoVersionsAvailable))?;

        let installed = self.installed_version();
        let update_available = installed.as_deref() != Some(latest.as_str());

        Ok(UpdateCheck {
            latest,
            installed,
            update_available,
        })
    }

    /// Download and apply `requested` (an exact version or `LATEST`)
    ///
    /// A blank request means `LATEST`.
    ///
    /// Always re-applies, even if `requested` is already installed, so a
    /// damaged install can be repaired by asking for the same version again.
    pub async fn update(&mut self, requested: &str) -> Result<UpdateOutcome, UpdateError> {
        self.history.clear();
        self.enter(SessionState::Idle);

        let previous = self.installed_version();
        let wanted = match requested.trim() {
            "" => LATEST.to_string(),
            trimmed => trimmed.to_string(),
        };

        // Resolving
        self.enter(SessionState::Resolving);
        let fetched = self.source.fetch_catalog().await;
        let catalog = match fetched {
            Ok(catalog) => catalog,
            Err(e) => return Err(self.fail((Stage::Resolving, e).into())),
        };

        let Some(head) = catalog.first() else {
            return Err(self.fail(UpdateError::new(
                Stage::Resolving,
                FailureCause::NoVersionsAvailable,
            )));
        };

        let expected = if wanted.eq_ignore_ascii_case(LATEST) {
            head.clone()
        } else {
            wanted.clone()
        };
        tracing::info!("Resolved '{}' to {}", wanted, expected);

        // Downloading
        self.enter(SessionState::Downloading);
        if let Err(source) = tokio::fs::create_dir_all(&self.scratch_dir).await {
            let err = SourceError::Io {
                path: self.scratch_dir.clone(),
                source,
            };
            return Err(self.fail((Stage::Downloading, err).into()));
        }

        let archive_path = self
            .scratch_dir
            .join(format!("{}.tar.gz.part", uuid::Uuid::new_v4()));

        let downloaded = self.source.download(&wanted, &archive_path).await;
        let version = match downloaded {
            Ok(resolved) => resolved.unwrap_or(expected),
            Err(e) => {
                discard_scratch(&archive_path).await;
                return Err(self.fail((Stage::Downloading, e).into()));
            }
        };

        if let Err(e) = self.verifier.verify(&version, &archive_path) {
            discard_scratch(&archive_path).await;
            return Err(self.fail(UpdateError::new(
                Stage::Downloading,
                FailureCause::VerificationFailed(e.to_string()),
            )));
        }

        // Extracting
        self.enter(SessionState::Extracting);
        let app_dir = self.app_dir.clone();
        let archive = archive_path.clone();
        let extracted =
            tokio::task::spawn_blocking(move || archive::extract_file(&archive, &app_dir)).await;

        let entries = match extracted {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) => {
                discard_scratch(&archive_path).await;
                return Err(self.fail(UpdateError::new(
                    Stage::Extracting,
                    FailureCause::ExtractionError(error_chain(&e)),
                )));
            }
            Err(join_error) => {
                discard_scratch(&archive_path).await;
                return Err(self.fail(UpdateError::new(
                    Stage::Extracting,
                    FailureCause::ExtractionError(join_error.to_string()),
                )));
            }
        };

        // Committing
        self.enter(SessionState::Committing);
        if let Err(e) = self.record.save(&version) {
            discard_scratch(&archive_path).await;
            tracing::error!(
                "Application directory {} now holds {} but the installed-version record was not written",
                self.app_dir.display(),
                version
            );
            return Err(self.fail(UpdateError::new(
                Stage::Committing,
                FailureCause::PersistError(error_chain(&e)),
            )));
        }
        discard_scratch(&archive_path).await;

        self.enter(SessionState::Done);
        tracing::info!(
            "Updated {} to {} ({} entries)",
            self.app_dir.display(),
            version,
            entries
        );

        Ok(UpdateOutcome {
            version,
            previous,
            entries,
        })
    }

    fn installed_version(&self) -> Option<String> {
        match self.record.load() {
            Ok(version) => version,
            Err(e) => {
                tracing::warn!("Treating installed version as unknown: {}", error_chain(&e));
                None
            }
        }
    }

    fn enter(&mut self, state: SessionState) {
        tracing::debug!("Update session: {:?} -> {:?}", self.state, state);
        self.state = state.clone();
        self.history.push(state);
    }

    fn fail(&mut self, err: UpdateError) -> UpdateError {
        tracing::error!("{}", err);
        self.enter(SessionState::Failed(err.clone()));
        err
    }
}

/// Remove a scratch archive, tolerating its absence
async fn discard_scratch(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove scratch archive {}: {}", path.display(), e),
    }
}
