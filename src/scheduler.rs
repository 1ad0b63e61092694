//! Bounded fan-out / fan-in over a known set of items.
//!
//! At most `concurrency` tasks are in flight at once. A failing task is logged
//! and dropped; it never cancels its siblings or reaches the caller as an error.
//! Output order follows completion order, not input order, so callers that need
//! to associate results with inputs must carry a key inside the result.

use crate::metrics;
use anyhow::Result;
use futures::stream::{self, StreamExt};
use log::warn;
use std::future::Future;

/// Worker count used when the caller has no better figure.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Runs `task` over every item with at most `concurrency` in flight and
/// returns the successful outputs.
pub async fn map_bounded<T, R, F, Fut>(
    job: &'static str,
    items: Vec<T>,
    concurrency: usize,
    mut task: F,
) -> Vec<R>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let total = items.len();
    let mut stream = stream::iter(items.into_iter().enumerate().map(|(index, item)| {
        let fut = task(item);
        async move { (index, fut.await) }
    }))
    .buffer_unordered(concurrency.max(1));

    let mut results = Vec::with_capacity(total);
    while let Some((index, outcome)) = stream.next().await {
        match outcome {
            Ok(value) => results.push(value),
            Err(e) => {
                warn!("[{}] task {} of {} failed: {:#}", job, index + 1, total, e);
                metrics::increment_scheduler_failure(job);
            }
        }
    }
    results
}

/// Result of a short-circuiting scan.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// A check answered `true`.
    pub found: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub last_error: Option<anyhow::Error>,
}

/// Checks items with bounded concurrency until one answers `true`.
///
/// Checks still in flight when a match arrives are dropped, so items after the
/// match may or may not have been looked at.
pub async fn scan_bounded<T, F, Fut>(
    job: &'static str,
    items: Vec<T>,
    concurrency: usize,
    check: F,
) -> ScanOutcome
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let mut stream =
        stream::iter(items.into_iter().map(check)).buffer_unordered(concurrency.max(1));

    let mut outcome = ScanOutcome::default();
    while let Some(result) = stream.next().await {
        match result {
            Ok(hit) => {
                outcome.succeeded += 1;
                if hit {
                    outcome.found = true;
                    break;
                }
            }
            Err(e) => {
                warn!("[{}] check failed: {:#}", job, e);
                metrics::increment_scheduler_failure(job);
                outcome.failed += 1;
                outcome.last_error = Some(e);
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn failed_item_is_dropped_and_siblings_survive() {
        let items: Vec<u32> = (1..=10).collect();
        let mut results = map_bounded("test", items, 3, |n| async move {
            if n == 5 {
                anyhow::bail!("item {} exploded", n);
            }
            Ok(n * 10)
        })
        .await;

        results.sort_unstable();
        assert_eq!(results.len(), 9);
        assert!(!results.contains(&50));
        assert_eq!(results[0], 10);
        assert_eq!(results[8], 100);
    }

    #[tokio::test]
    async fn never_exceeds_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = map_bounded("test", (0..20u64).collect(), 4, |n| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1 + n % 3)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(n)
            }
        })
        .await;

        assert_eq!(results.len(), 20);
        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn zero_concurrency_is_treated_as_one() {
        let results = map_bounded("test", vec![1, 2, 3], 0, |n| async move { Ok(n) }).await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn scan_stops_on_first_hit() {
        let checked = Arc::new(AtomicUsize::new(0));
        let outcome = scan_bounded("test", (0..100u32).collect(), 1, |n| {
            let checked = checked.clone();
            async move {
                checked.fetch_add(1, Ordering::SeqCst);
                Ok(n == 1)
            }
        })
        .await;

        assert!(outcome.found);
        assert!(checked.load(Ordering::SeqCst) < 100);
    }

    #[tokio::test]
    async fn scan_reports_failures_without_a_hit() {
        let outcome = scan_bounded("test", vec![0u32, 1, 2], 2, |n| async move {
            if n == 1 {
                anyhow::bail!("boom");
            }
            Ok(false)
        })
        .await;

        assert!(!outcome.found);
        assert_eq!((outcome.succeeded, outcome.failed), (2, 1));
        assert!(outcome.last_error.is_some());
    }
}
