//! Async facade over the blocking core
//!
//! Every core operation is synchronous. Async callers run them on tokio's
//! blocking pool, optionally bounded by an overall timeout.

use crate::error::{Error, Result};
use std::time::Duration;
use tracing::warn;

/// Run `f` on the blocking pool, failing with `Error::Timeout` when it does
/// not finish within `timeout`.
///
/// A timed-out call keeps running in the background until it returns; its
/// result is discarded.
pub async fn run_blocking<T, F>(operation: &str, timeout: Option<Duration>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(operation, timeout_ms = limit.as_millis() as u64, "operation timed out");
                return Err(Error::Timeout {
                    operation: operation.to_string(),
                    timeout: limit,
                });
            }
        },
        None => handle.await,
    };
    joined.map_err(|e| Error::Runtime(format!("{} task failed: {}", operation, e)))?
}

/// Synchronous wrapper creating a runtime for one call.
///
/// The runtime is shut down without waiting for blocking work, so a timeout
/// returns as soon as it fires.
pub fn block_on_blocking<T, F>(operation: &str, timeout: Option<Duration>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .build()
        .map_err(|e| Error::Runtime(e.to_string()))?;
    let result = rt.block_on(run_blocking(operation, timeout, f));
    rt.shutdown_background();
    result
}
