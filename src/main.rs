//! pgsqlbackup
//!
//! Dumps every database on a PostgreSQL server (minus a configured exclusion
//! set) into a dated directory, archives the successful dumps, and removes the
//! working directory. Exit code 0 means an archive was produced (or there was
//! nothing to back up); partial per-database failure is still process-level
//! success and is reported in the summary log instead.

// pgsqlbackup/src/main.rs
mod backup;
mod config;
mod errors;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::backup::RunReport;
use crate::config::{LogConfig, Settings};

const DEFAULT_SETTINGS_FILE: &str = "settings.json";

#[tokio::main]
async fn main() -> ExitCode {
    match run_app().await {
        Ok(report) => {
            match &report.archive {
                Some(path) => println!(
                    "✅ Backup {} complete: {} ({} dumped, {} failed, {} excluded)",
                    report.date,
                    path.display(),
                    report.succeeded.len(),
                    report.failed.len(),
                    report.excluded,
                ),
                None => println!(
                    "✅ Backup {}: nothing to back up ({} excluded)",
                    report.date, report.excluded
                ),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Backup failed: {e:?}");
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<RunReport> {
    let args: Vec<String> = env::args().collect();
    let settings_path = args
        .get(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));

    let settings = Settings::load(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    init_logging(settings.log.as_ref())?;

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("shutdown requested, terminating in-flight dumps");
            shutdown.cancel();
        }
    });

    let report = backup::run_backup_flow(&settings, &cancel).await?;
    Ok(report)
}

fn init_logging(log: Option<&LogConfig>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match log {
        Some(cfg) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&cfg.file)
                .with_context(|| format!("failed to open log file {}", cfg.file.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}
