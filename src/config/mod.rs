// pgsqlbackup/src/config/mod.rs
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::BackupError;

fn default_concurrency() -> usize {
    1
}

/// Connection parameters for the enumeration connection. The password is used
/// only here; `pg_dump` authenticates out-of-band via `~/.pgpass` or
/// `PGPASSFILE` and never sees a credential on its command line.
#[derive(Debug, Clone, Deserialize)]
pub struct PgConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub default_db: String,
    pub user: String,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PgDumpConfig {
    pub bin: PathBuf,
    /// Per-dump timeout in seconds. Absent means unbounded.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub file: PathBuf,
}

/// Application settings, loaded once at startup and passed immutably to every
/// component. Mirrors the keys of `settings.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub backup_path: PathBuf,
    #[serde(default)]
    pub exclude: BTreeSet<String>,
    pub pgsql: PgConfig,
    pub pg_dump: PgDumpConfig,
    pub log: Option<LogConfig>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, BackupError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            BackupError::Config(format!("could not read settings file {}: {e}", path.display()))
        })?;
        let settings: Settings = serde_json::from_str(&raw).map_err(|e| {
            BackupError::Config(format!("could not parse settings file {}: {e}", path.display()))
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), BackupError> {
        if self.backup_path.as_os_str().is_empty() {
            return Err(BackupError::Config("backup_path must not be empty".into()));
        }
        if self.pgsql.default_db.trim().is_empty() {
            return Err(BackupError::Config("pgsql.default_db must not be empty".into()));
        }
        if self.pgsql.user.trim().is_empty() {
            return Err(BackupError::Config("pgsql.user must not be empty".into()));
        }
        if self.pg_dump.bin.as_os_str().is_empty() {
            return Err(BackupError::Config("pg_dump.bin must not be empty".into()));
        }
        if self.concurrency == 0 {
            return Err(BackupError::Config("concurrency must be at least 1".into()));
        }
        Ok(())
    }
}
