// pgsqlbackup/src/backup/db_dump.rs
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Settings;
use crate::errors::DumpError;

/// Outcome of one dump attempt.
#[derive(Debug)]
pub enum DumpResult {
    Succeeded(PathBuf),
    Failed(DumpError),
}

/// Runs the external dump tool for one database at a time. Authentication is
/// out-of-band (`~/.pgpass` / `PGPASSFILE`); the command line carries only the
/// user and the database name, each as a discrete argument.
#[derive(Debug, Clone)]
pub struct DumpTool {
    bin: PathBuf,
    user: String,
    timeout: Option<Duration>,
}

impl DumpTool {
    pub fn new(bin: PathBuf, user: String, timeout: Option<Duration>) -> Self {
        // Resolve bare names through PATH up front; an unresolvable name is
        // kept as-is so the spawn failure surfaces as a per-database Failed.
        let bin = if bin.components().count() == 1 {
            which::which(&bin).unwrap_or(bin)
        } else {
            bin
        };
        Self { bin, user, timeout }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.pg_dump.bin.clone(),
            settings.pgsql.user.clone(),
            settings.pg_dump.timeout_secs.map(Duration::from_secs),
        )
    }

    /// Dumps `db` into `dir/<db>.sql`. The tool's stdout goes to a `.part`
    /// file which is renamed into place only on a zero exit status, so the
    /// final path never holds a truncated dump.
    ///
    /// Quoted PostgreSQL names may contain path separators, so names outside
    /// the safe character set are refused before any path is built from them.
    pub async fn dump(&self, db: &str, dir: &Path, cancel: &CancellationToken) -> DumpResult {
        if !is_safe_db_name(db) {
            return DumpResult::Failed(DumpError::UnsafeName { db: db.to_string() });
        }
        match self.run_dump(db, dir, cancel).await {
            Ok(path) => DumpResult::Succeeded(path),
            Err(err) => {
                let _ = std::fs::remove_file(part_path(dir, db));
                DumpResult::Failed(err)
            }
        }
    }

    async fn run_dump(
        &self,
        db: &str,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, DumpError> {
        let final_path = dir.join(format!("{db}.sql"));
        let part = part_path(dir, db);
        let out = std::fs::File::create(&part)?;

        debug!(db, bin = %self.bin.display(), "spawning dump tool");
        let mut child = Command::new(&self.bin)
            .arg("-U")
            .arg(&self.user)
            .arg("--no-password")
            .arg(db)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DumpError::Spawn { bin: self.bin.clone(), source })?;

        // Drain stderr concurrently so a chatty tool cannot block on a full pipe.
        let mut stderr_pipe = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                let _ = pipe.read_to_end(&mut buf).await;
            }
            buf
        });

        let timeout = self.timeout;
        let wait = async {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                    Ok(status) => status.map_err(DumpError::Io),
                    Err(_) => Err(DumpError::TimedOut(limit)),
                },
                None => child.wait().await.map_err(DumpError::Io),
            }
        };
        let outcome = tokio::select! {
            status = wait => status,
            _ = cancel.cancelled() => Err(DumpError::Cancelled),
        };

        let status = match outcome {
            Ok(status) => status,
            Err(err) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                return Err(err);
            }
        };

        let stderr_buf = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(DumpError::Exit {
                status,
                stderr: String::from_utf8_lossy(&stderr_buf).trim().to_string(),
            });
        }

        tokio::fs::rename(&part, &final_path).await?;
        Ok(final_path)
    }
}

fn part_path(dir: &Path, db: &str) -> PathBuf {
    dir.join(format!("{db}.sql.part"))
}

fn is_safe_db_name(db: &str) -> bool {
    !db.trim().is_empty()
        && !db.contains(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
}
