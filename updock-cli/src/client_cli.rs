//! Client commands: versions, check, update, status

use anyhow::{Context, Result};
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

use updock_core::client::{HttpSource, InstalledRecord, UpdateSession, UpdateSource};
use updock_core::config::ClientConfig;
use updock_core::UpdateError;

fn open_session(config: &ClientConfig) -> Result<UpdateSession<HttpSource>> {
    config.validate().context("Invalid client configuration")?;

    let source = HttpSource::with_timeout(&config.server_url, config.timeout())
        .context("Failed to create HTTP client")?;

    Ok(UpdateSession::new(
        source,
        &config.app_dir,
        InstalledRecord::new(&config.version_file),
        &config.scratch_dir,
    ))
}

/// Installed version for display; unreadable records are reported, not fatal
fn installed_version(record: &InstalledRecord) -> Option<String> {
    match record.load() {
        Ok(version) => version,
        Err(e) => {
            eprintln!("Warning: {e:#}");
            None
        }
    }
}

#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Latest")]
    latest: String,
    #[tabled(rename = "Installed")]
    installed: String,
}

pub async fn versions(config: &ClientConfig, json_output: bool) -> Result<()> {
    let source = HttpSource::with_timeout(&config.server_url, config.timeout())
        .context("Failed to create HTTP client")?;
    let catalog = source
        .fetch_catalog()
        .await
        .with_context(|| format!("Failed to fetch versions from {}", config.server_url))?;
    let installed = installed_version(&InstalledRecord::new(&config.version_file));

    if json_output {
        let output = serde_json::json!({
            "versions": catalog,
            "latest": catalog.first(),
            "installed": installed,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if catalog.is_empty() {
        println!("No versions available on {}", config.server_url);
        return Ok(());
    }

    let rows: Vec<VersionRow> = catalog
        .iter()
        .enumerate()
        .map(|(i, version)| VersionRow {
            version: version.clone(),
            latest: if i == 0 { "yes".to_string() } else { String::new() },
            installed: if installed.as_deref() == Some(version.as_str()) {
                "yes".to_string()
            } else {
                String::new()
            },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::first()).with(Alignment::center()))
        .to_string();

    println!("Versions on {}:\n", config.server_url);
    println!("{table}");

    Ok(())
}

pub async fn check(config: &ClientConfig, json_output: bool) -> Result<()> {
    let session = open_session(config)?;

    let check = match session.check_for_update().await {
        Ok(check) => check,
        Err(e) => report_failure(&e, config),
    };

    if json_output {
        let output = serde_json::json!({
            "latest": check.latest,
            "installed": check.installed,
            "update_available": check.update_available,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let installed = check.installed.as_deref().unwrap_or("none");
    if check.update_available {
        println!("Update available: {} (installed: {})", check.latest, installed);
        println!("\nRun 'updock update' to apply it.");
    } else {
        println!("Up to date: {}", installed);
    }

    Ok(())
}

pub async fn update(config: &ClientConfig, version: &str) -> Result<()> {
    let mut session = open_session(config)?;

    println!("Updating {} to {}...", config.app_dir.display(), version.trim());

    match session.update(version).await {
        Ok(outcome) => {
            match outcome.previous.as_deref() {
                Some(previous) if previous == outcome.version => {
                    println!("Reapplied {}", outcome.version);
                }
                Some(previous) => println!("Updated {} -> {}", previous, outcome.version),
                None => println!("Installed {}", outcome.version),
            }
            println!("Files:    {}", outcome.entries);
            println!("Location: {}", config.app_dir.display());
            Ok(())
        }
        Err(e) => report_failure(&e, config),
    }
}

pub fn status(config: &ClientConfig, json_output: bool) -> Result<()> {
    let record = InstalledRecord::new(&config.version_file);
    let installed = installed_version(&record);

    if json_output {
        let output = serde_json::json!({
            "installed": installed,
            "server_url": config.server_url,
            "app_dir": config.app_dir,
            "version_file": config.version_file,
            "scratch_dir": config.scratch_dir,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Installed:    {}", installed.as_deref().unwrap_or("none"));
    println!("Server:       {}", config.server_url);
    println!("App dir:      {}", config.app_dir.display());
    println!("Version file: {}", config.version_file.display());
    println!("Scratch dir:  {}", config.scratch_dir.display());

    Ok(())
}

/// Print an actionable message for a failed session and exit non-zero
///
/// Exit code 2 means the application directory was replaced but the
/// installed-version record was not written; 1 is every other failure.
fn report_failure(err: &UpdateError, config: &ClientConfig) -> ! {
    tracing::error!("{}", err);
    eprintln!("\nError: {err}");

    if err.is_applied_but_unrecorded() {
        eprintln!(
            "The application in {} WAS updated, but the installed-version record {} was not written.",
            config.app_dir.display(),
            config.version_file.display()
        );
        eprintln!("Fix the record location and run 'updock update' again to re-apply and record it.");
        std::process::exit(2);
    }

    if err.is_retryable() {
        eprintln!("This looks transient; running the command again is safe.");
    }
    eprintln!("The installed version and application directory were left unchanged.");
    std::process::exit(1);
}
