//! Configuration for host and client
//!
//! Resolution order, lowest to highest precedence:
//! 1. built-in defaults
//! 2. `updock.yaml` (platform config directory, or an explicit path)
//! 3. `UPDOCK_*` environment variables
//! 4. command-line flags (applied by the CLI)
//!
//! ```yaml
//! host:
//!   bind: 0.0.0.0
//!   port: 8787
//!   packages_dir: /srv/updock/packages
//! client:
//!   server_url: https://updates.example.com
//!   app_dir: /opt/myapp
//!   version_file: /var/lib/myapp/installed_version
//!   scratch_dir: /var/lib/myapp/scratch
//!   timeout_secs: 300
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "updock.yaml";

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;

pub const ENV_BIND: &str = "UPDOCK_BIND";
pub const ENV_PORT: &str = "UPDOCK_PORT";
pub const ENV_PACKAGES_DIR: &str = "UPDOCK_PACKAGES_DIR";
pub const ENV_SERVER_URL: &str = "UPDOCK_SERVER_URL";
pub const ENV_APP_DIR: &str = "UPDOCK_APP_DIR";
pub const ENV_VERSION_FILE: &str = "UPDOCK_VERSION_FILE";
pub const ENV_SCRATCH_DIR: &str = "UPDOCK_SCRATCH_DIR";

/// Host settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Listen address
    pub bind: String,

    pub port: u16,

    /// Directory holding one subdirectory per version
    pub packages_dir: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            packages_dir: PathBuf::from("packages"),
        }
    }
}

impl HostConfig {
    /// `bind:port`, ready for a TCP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the host, e.g. `http://127.0.0.1:8787`
    pub server_url: String,

    /// Managed application directory; replaced wholesale on every update
    pub app_dir: PathBuf,

    /// Installed-version record
    pub version_file: PathBuf,

    /// Where downloads are staged before extraction
    pub scratch_dir: PathBuf,

    /// Optional per-request timeout; unset means wait indefinitely
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: format!("http://{DEFAULT_BIND}:{DEFAULT_PORT}"),
            app_dir: PathBuf::from("app"),
            version_file: PathBuf::from(".updock/installed_version"),
            scratch_dir: PathBuf::from(".updock/scratch"),
            timeout_secs: None,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Check invariants the update session relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "server_url",
                value: self.server_url.clone(),
            });
        }

        if self.app_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "app_dir",
                value: String::new(),
            });
        }

        let app_dir = normalize(&self.app_dir);
        for (what, path) in [
            ("version_file", &self.version_file),
            ("scratch_dir", &self.scratch_dir),
        ] {
            if normalize(path).starts_with(&app_dir) {
                return Err(ConfigError::InsideAppDir {
                    what,
                    path: path.clone(),
                    app_dir: self.app_dir.clone(),
                });
            }
        }

        Ok(())
    }
}

/// Complete configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdockConfig {
    pub host: HostConfig,
    pub client: ClientConfig,
}

impl UpdockConfig {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let path = default_config_path()?;
        Self::load_from_path(&path)
    }

    /// Load from `path` (defaults if it does not exist), then apply
    /// environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
            serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            UpdockConfig::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `UPDOCK_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup(ENV_BIND) {
            self.host.bind = bind;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.host.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_PORT,
                    value: port.clone(),
                })?;
        }
        if let Some(dir) = lookup(ENV_PACKAGES_DIR) {
            self.host.packages_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup(ENV_SERVER_URL) {
            self.client.server_url = url;
        }
        if let Some(dir) = lookup(ENV_APP_DIR) {
            self.client.app_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup(ENV_VERSION_FILE) {
            self.client.version_file = PathBuf::from(file);
        }
        if let Some(dir) = lookup(ENV_SCRATCH_DIR) {
            self.client.scratch_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}

/// `updock.yaml` in the platform config directory
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = directories::ProjectDirs::from("io", "updock", "updock")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .or_else(|| dirs::config_dir().map(|d| d.join("updock")))
        .ok_or(ConfigError::NoConfigDir)?;

    Ok(config_dir.join(CONFIG_FILE))
}

/// Lexically normalize a path against the current directory
///
/// Does not touch the filesystem; the paths may not exist yet.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
