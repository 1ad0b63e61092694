//! Error taxonomy for the aggregation layer.
//!
//! Most failures in this crate are recoverable and never leave the module that
//! observed them: they are logged and replaced with a degraded value. The
//! variants here are the ones callers must be able to tell apart from a
//! legitimately empty or zero result.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregatorError {
    /// Every per-token read of a scan failed, so "nothing found" cannot be claimed.
    #[error("all {attempted} claimable reads failed: {last_error}")]
    AllReadsFailed { attempted: usize, last_error: String },

    /// An operation raced against its deadline and lost.
    #[error("{operation} did not complete within {after:?}")]
    DeadlineExceeded {
        operation: &'static str,
        after: Duration,
    },
}

/// JSON-RPC error codes providers use when throttling.
const RATE_LIMIT_CODES: &[&str] = &["-32005", "-32029", "429"];

const RATE_LIMIT_PHRASES: &[&str] = &["rate limit", "too many requests", "limit exceeded"];

/// Returns `true` when the error looks like provider throttling rather than a real failure.
///
/// Throttling is expected under load and is handled the same way as any other
/// recoverable read failure, only logged at a lower level.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    let message = format!("{:#}", err).to_lowercase();
    RATE_LIMIT_CODES.iter().any(|code| message.contains(code))
        || RATE_LIMIT_PHRASES.iter().any(|phrase| message.contains(phrase))
}
