//! updock - serve versioned packages and apply them atomically
//!
//! `updock serve` runs the package host; the other commands act as its
//! client against a local application directory.

use anyhow::{Context, Result};
use clap::{Args, Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use updock_core::archive;
use updock_core::catalog::{VersionId, LATEST};
use updock_core::config::{self, UpdockConfig};
use updock_core::host;

mod client_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "updock",
    about = "Serve versioned packages and apply them atomically",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[clap(long, global = true)]
    json_logs: bool,

    #[clap(flatten)]
    settings: SettingsArgs,
}

/// Flags layered over the configuration file
#[derive(Args, Debug)]
struct SettingsArgs {
    /// Configuration file (defaults to updock.yaml in the platform config directory)
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Override the host URL used by client commands
    #[clap(long, global = true)]
    server_url: Option<String>,

    /// Override the managed application directory
    #[clap(long, global = true)]
    app_dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Serve the package directory over HTTP
    Serve {
        /// Listen address
        #[clap(long)]
        bind: Option<String>,

        /// Listen port
        #[clap(long)]
        port: Option<u16>,

        /// Directory holding one subdirectory per version
        #[clap(long)]
        packages_dir: Option<PathBuf>,
    },

    /// List versions offered by the host
    Versions {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Check whether the host has a different version than the one installed
    Check {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Download and apply a version
    Update {
        /// Exact version or LATEST
        #[clap(default_value = LATEST)]
        version: String,
    },

    /// Show the installed version and configured paths
    Status {
        /// Output as JSON
        #[clap(long)]
        json: bool,
    },

    /// Write a directory as a package archive
    Package {
        /// Directory to package
        dir: PathBuf,

        /// Top-level name inside the archive (defaults to the directory name)
        #[clap(long)]
        name: Option<String>,

        /// Output directory for the tarball
        #[clap(long, short, default_value = ".")]
        output: PathBuf,
    },
}

fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_config(settings: &SettingsArgs) -> Result<UpdockConfig> {
    let path = match &settings.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };

    let mut config = UpdockConfig::load_from_path(&path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    if let Some(url) = &settings.server_url {
        config.client.server_url = url.clone();
    }
    if let Some(dir) = &settings.app_dir {
        config.client.app_dir = dir.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level, cli.json_logs);

    match cli.command {
        Command::Serve {
            bind,
            port,
            packages_dir,
        } => {
            let mut config = load_config(&cli.settings)?;
            if let Some(bind) = bind {
                config.host.bind = bind;
            }
            if let Some(port) = port {
                config.host.port = port;
            }
            if let Some(dir) = packages_dir {
                config.host.packages_dir = dir;
            }

            host::serve(&config.host)
                .await
                .with_context(|| format!("Host failed on {}", config.host.listen_addr()))
        }
        Command::Versions { json } => {
            let config = load_config(&cli.settings)?;
            client_cli::versions(&config.client, json).await
        }
        Command::Check { json } => {
            let config = load_config(&cli.settings)?;
            client_cli::check(&config.client, json).await
        }
        Command::Update { version } => {
            let config = load_config(&cli.settings)?;
            client_cli::update(&config.client, &version).await
        }
        Command::Status { json } => {
            let config = load_config(&cli.settings)?;
            client_cli::status(&config.client, json)
        }
        Command::Package { dir, name, output } => package(&dir, name.as_deref(), &output),
    }
}

fn package(dir: &Path, name: Option<&str>, output: &Path) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let name = match name {
        Some(name) => name.to_string(),
        None => dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", dir.display()))?
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .context("Could not derive a package name from the directory; pass --name")?,
    };

    if !VersionId::is_valid(&name) {
        eprintln!(
            "Warning: '{name}' is not a version identifier; a host will not list a directory with this name"
        );
    }

    let tarball = archive::write_package_file(dir, &name, output)
        .with_context(|| format!("Failed to package {}", dir.display()))?;
    let size = std::fs::metadata(&tarball)
        .with_context(|| format!("Failed to stat {}", tarball.display()))?
        .len();

    info!("Packaged {} as {}", dir.display(), name);
    println!("Created: {}", tarball.display());
    println!("Size:    {size} bytes");

    Ok(())
}
