//! Racing steps against a cancellation token

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::WorkflowError;

/// Run `step` unless `cancel` fires first
pub async fn cancellable<F>(cancel: &CancellationToken, step: F) -> Result<F::Output, WorkflowError>
where
    F: Future,
{
    if cancel.is_cancelled() {
        debug!("cancellable: already cancelled");
        return Err(WorkflowError::Cancelled);
    }

    tokio::select! {
        biased;

        _ = cancel.cancelled() => {
            debug!("cancellable: cancelled mid-step");
            Err(WorkflowError::Cancelled)
        }

        output = step => Ok(output),
    }
}
