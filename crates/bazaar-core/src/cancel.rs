//! Cancellation helpers shared by every store and service.
//!
//! Each request carries a [`CancellationToken`]. Store operations race
//! their query against it, and multi-step flows call [`ensure_active`]
//! before each mutating step so a cancelled request stops before it
//! writes anything further.

use std::future::Future;

use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::result::AppResult;

/// Return `Cancelled` if the token has already fired.
pub fn ensure_active(cancel: &CancellationToken) -> AppResult<()> {
    if cancel.is_cancelled() {
        return Err(AppError::cancelled("Request was cancelled"));
    }
    Ok(())
}

/// Drive `fut` to completion unless `cancel` fires first.
///
/// The check is biased toward cancellation so an already-cancelled token
/// never starts the operation.
pub async fn run_cancellable<T, F>(cancel: &CancellationToken, fut: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::cancelled("Request was cancelled")),
        result = fut => result,
    }
}
