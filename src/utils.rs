// src/utils.rs
// Utility functions for the Token Ledger SDK

use crate::errors::AggregatorError;
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Races `fut` against a timer. Past the deadline the future is dropped and a
/// [`AggregatorError::DeadlineExceeded`] is returned instead of waiting on.
///
/// Meant for startup and reconnect paths that must not block; steady-state
/// reads rely on the transport's own timeouts.
pub async fn with_deadline<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!("⏱️ {} abandoned after {:?}", operation, after);
            Err(AggregatorError::DeadlineExceeded { operation, after }.into())
        }
    }
}
