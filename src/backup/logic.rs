// pgsqlbackup/src/backup/logic.rs
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::backup::archive;
use crate::backup::db_dump::{DumpResult, DumpTool};
use crate::backup::enumerate;
use crate::config::Settings;
use crate::errors::BackupError;

const ARCHIVE_EXT: &str = "tar.gz";

/// One orchestrator invocation, identified by its date. Concurrent runs for
/// the same date are unsupported: the run assumes exclusive ownership of its
/// working directory and only warns if it finds the directory already in use.
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub date: String,
    pub working_dir: PathBuf,
    pub archive_path: PathBuf,
}

impl BackupRun {
    pub fn new(backup_root: &Path, date: &str) -> Self {
        let working_dir = backup_root.join(date);
        let archive_path = backup_root.join(format!("{date}.{ARCHIVE_EXT}"));
        Self { date: date.to_string(), working_dir, archive_path }
    }

    pub fn for_today(backup_root: &Path) -> Self {
        Self::new(backup_root, &Local::now().format("%Y-%m-%d").to_string())
    }
}

/// Externally observable result of a completed run.
#[derive(Debug)]
pub struct RunReport {
    pub date: String,
    /// `None` only for the no-op case (nothing to back up).
    pub archive: Option<PathBuf>,
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub excluded: usize,
}

/// Drives one full run: enumerate, dump with bounded concurrency, archive the
/// successful subset, delete the working directory. Per-database dump failures
/// are isolated; every other error aborts the remaining stages.
pub async fn run(settings: &Settings, cancel: &CancellationToken) -> Result<RunReport, BackupError> {
    let run = BackupRun::for_today(&settings.backup_path);
    info!(date = %run.date, dir = %run.working_dir.display(), "starting backup run");

    ensure_working_dir(&run.working_dir)?;

    let names = enumerate::list_databases(&settings.pgsql).await?;
    let (targets, excluded) = enumerate::filter_targets(names, &settings.exclude);
    if targets.is_empty() {
        info!(excluded, "no databases to back up, nothing to do");
        return Ok(RunReport {
            date: run.date,
            archive: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
            excluded,
        });
    }

    execute_run(settings, &run, targets, excluded, cancel).await
}

/// Everything after enumeration: dump fan-out, archive, cleanup.
pub(crate) async fn execute_run(
    settings: &Settings,
    run: &BackupRun,
    targets: Vec<String>,
    excluded: usize,
    cancel: &CancellationToken,
) -> Result<RunReport, BackupError> {
    let attempted = targets.len();
    let (mut succeeded, failed) = dump_all(settings, &run.working_dir, targets, cancel).await;

    for (db, reason) in &failed {
        error!(db = %db, reason = %reason, "could not dump database");
    }
    if succeeded.is_empty() {
        error!(attempted, "every dump failed, working directory retained at {}", run.working_dir.display());
        return Err(BackupError::AllDumpsFailed { attempted });
    }

    // Completion order is nondeterministic under concurrency; the archive
    // content is a set, but keep its entry order stable anyway.
    succeeded.sort();
    let files: Vec<String> = succeeded.iter().map(|db| format!("{db}.sql")).collect();
    archive::create_archive(&run.working_dir, &files, &run.archive_path)?;

    remove_working_dir(&run.working_dir);

    info!(
        date = %run.date,
        archive = %run.archive_path.display(),
        succeeded = succeeded.len(),
        failed = failed.len(),
        excluded,
        "backup run complete"
    );
    Ok(RunReport {
        date: run.date.clone(),
        archive: Some(run.archive_path.clone()),
        succeeded,
        failed,
        excluded,
    })
}

/// Dumps every target with at most `concurrency` subprocesses in flight.
/// Returns the succeeded database names and the (database, reason) failures.
async fn dump_all(
    settings: &Settings,
    working_dir: &Path,
    targets: Vec<String>,
    cancel: &CancellationToken,
) -> (Vec<String>, Vec<(String, String)>) {
    let tool = DumpTool::from_settings(settings);
    let permits = Arc::new(Semaphore::new(settings.concurrency));
    let mut tasks = JoinSet::new();

    for db in targets {
        let tool = tool.clone();
        let permits = Arc::clone(&permits);
        let dir = working_dir.to_path_buf();
        let cancel = cancel.clone();
        tasks.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return (db, DumpResult::Failed(crate::errors::DumpError::Cancelled));
            };
            let result = tool.dump(&db, &dir, &cancel).await;
            (db, result)
        });
    }

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((db, DumpResult::Succeeded(path))) => {
                info!(db = %db, file = %path.display(), "database dumped");
                succeeded.push(db);
            }
            Ok((db, DumpResult::Failed(err))) => failed.push((db, err.to_string())),
            Err(join_err) => error!("dump task panicked: {join_err}"),
        }
    }
    (succeeded, failed)
}

fn ensure_working_dir(dir: &Path) -> Result<(), BackupError> {
    if dir.is_dir() {
        let occupied = fs::read_dir(dir).map(|mut it| it.next().is_some()).unwrap_or(false);
        if occupied {
            warn!(
                dir = %dir.display(),
                "working directory already contains files; a concurrent run for the same date is unsupported"
            );
        }
    }
    fs::create_dir_all(dir)
        .map_err(|source| BackupError::Directory { path: dir.to_path_buf(), source })
}

/// Recursive removal of the working directory. Idempotent; failure is a
/// warning because the run already succeeded once the archive exists.
pub(crate) fn remove_working_dir(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), "could not delete working directory: {e}"),
    }
}
