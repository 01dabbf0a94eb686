pub(crate) mod archive;
pub(crate) mod db_dump;
pub(crate) mod enumerate;
mod logic;

pub use logic::RunReport;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::errors::BackupError;

/// Public entry point for the backup pipeline: one run per invocation.
pub async fn run_backup_flow(
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<RunReport, BackupError> {
    logic::run(settings, cancel).await
}
