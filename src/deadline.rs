//! Optional per-phase timeouts for network I/O.

use std::future::Future;
use std::time::Duration;

use crate::error::{FleetError, Result};

/// Awaits `fut`, failing with `on_elapsed` if `limit` is set and runs out.
pub async fn within<T, F>(
    limit: Option<Duration>,
    fut: F,
    on_elapsed: impl FnOnce(Duration) -> FleetError,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| on_elapsed(limit))?,
        None => fut.await,
    }
}
