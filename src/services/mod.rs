//! Resolution pipeline services.

pub mod cache;
pub mod parser;
pub mod resolver;
pub mod retention;
pub mod staging;

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

pub use cache::RunCache;
pub use parser::{DocumentOutcome, parse_run};
pub use resolver::RunResolver;
pub use retention::{RetentionSweeper, SweepReport, start_retention_task};
pub use staging::{RunStaging, StagingFileSystem};

/// Fail with [`AppError::Cancelled`] once `cancel` has fired.
pub(crate) fn ensure_active(cancel: &CancellationToken) -> AppResult<()> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    Ok(())
}
