use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

/// Run-level errors. Any of these aborts the remaining pipeline stages.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("could not connect to PostgreSQL server: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("database catalog query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("could not prepare working directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("dump file {file} reported as succeeded but is missing on disk")]
    MissingDump { file: PathBuf },

    #[error("could not write archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("all {attempted} dump(s) failed, no archive produced")]
    AllDumpsFailed { attempted: usize },
}

/// Per-database dump failures. These are isolated: one failing database never
/// aborts the dumps of its siblings.
#[derive(Error, Debug)]
pub enum DumpError {
    #[error("could not launch dump tool {bin}: {source}")]
    Spawn {
        bin: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("dump tool exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },

    #[error("dump exceeded the configured timeout of {0:?}")]
    TimedOut(Duration),

    #[error("database name {db:?} contains unsupported characters, refusing to dump")]
    UnsafeName { db: String },

    #[error("dump cancelled by shutdown request")]
    Cancelled,

    #[error("dump output file error: {0}")]
    Io(#[from] io::Error),
}
