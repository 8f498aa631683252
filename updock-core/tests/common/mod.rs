//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Once;

use tempfile::TempDir;
use updock_core::catalog::VersionStore;
use updock_core::client::{HttpSource, InstalledRecord, UpdateSession};

/// Initialize logging for tests (only once per test run)
static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_level(true),
            )
            .with(tracing_subscriber::filter::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Write `files` (relative path → content) under `dir`
pub fn write_tree(dir: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }
}

/// Every regular file under `dir`, keyed by path relative to `dir`
pub fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .map(|entry| entry.unwrap())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let relative = entry.path().strip_prefix(dir).unwrap().to_path_buf();
            (relative, std::fs::read(entry.path()).unwrap())
        })
        .collect()
}

/// A package root with a few versions, served on a random local port
pub struct TestHost {
    pub packages: TempDir,
    pub addr: SocketAddr,
}

impl TestHost {
    pub async fn start() -> Self {
        init_test_logging();

        let packages = TempDir::new().unwrap();
        write_tree(
            &packages.path().join("1.0.0"),
            &[
                ("index.js", "console.log('one');"),
                ("lib/util.js", "module.exports = 1;"),
                ("retired.txt", "only shipped in 1.0.0"),
            ],
        );
        write_tree(
            &packages.path().join("2.1.0"),
            &[
                ("index.js", "console.log('two');"),
                ("lib/util.js", "module.exports = 2;"),
                ("assets/logo.svg", "<svg/>"),
            ],
        );
        write_tree(
            &packages.path().join("1.0.0-beta.1"),
            &[("index.js", "beta")],
        );
        std::fs::write(packages.path().join("README.md"), "not a package").unwrap();

        Self::start_with(packages).await
    }

    pub async fn start_with(packages: TempDir) -> Self {
        init_test_logging();

        let store = VersionStore::new(packages.path());
        let (addr, _handle) = updock_core::host::start_on("127.0.0.1:0".parse().unwrap(), store)
            .await
            .unwrap();

        Self { packages, addr }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn package_dir(&self, version: &str) -> PathBuf {
        self.packages.path().join(version)
    }
}

/// Client-side directories for one session
pub struct ClientDirs {
    pub temp: TempDir,
    pub app_dir: PathBuf,
    pub record_path: PathBuf,
    pub scratch_dir: PathBuf,
}

impl ClientDirs {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        Self {
            app_dir: temp.path().join("app"),
            record_path: temp.path().join("state/installed_version"),
            scratch_dir: temp.path().join("state/scratch"),
            temp,
        }
    }

    pub fn record(&self) -> InstalledRecord {
        InstalledRecord::new(&self.record_path)
    }

    pub fn session(&self, base_url: &str) -> UpdateSession<HttpSource> {
        UpdateSession::new(
            HttpSource::new(base_url).unwrap(),
            &self.app_dir,
            self.record(),
            &self.scratch_dir,
        )
    }

    pub fn scratch_files(&self) -> usize {
        match std::fs::read_dir(&self.scratch_dir) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}
