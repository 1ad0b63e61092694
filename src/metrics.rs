// src/metrics.rs

#[cfg(feature = "observability")]
pub use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter, Unit,
};

// NOTE: When observability feature is disabled, provide stub implementations
#[cfg(not(feature = "observability"))]
pub enum Unit {}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! counter {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! gauge {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! histogram {
    ($name:expr, $value:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! increment_counter {
    ($name:expr $(, $label:expr => $label_value:expr)* $(,)?) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_counter {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_gauge {
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
#[macro_export]
macro_rules! describe_histogram {
    ($name:expr, $unit:expr, $desc:expr) => {};
    ($name:expr, $desc:expr) => {};
}

#[cfg(not(feature = "observability"))]
use crate::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
    increment_counter,
};

/// Initializes the descriptions for all the metrics in the SDK.
/// Call once at startup, after the recorder is installed.
pub fn describe_metrics() {
    describe_counter!(
        "cache_hits_total",
        Unit::Count,
        "Cache lookups answered from a live entry, labeled by cache."
    );
    describe_counter!(
        "cache_miss_total",
        Unit::Count,
        "Cache lookups that found nothing or an expired entry, labeled by cache."
    );
    describe_gauge!(
        "cache_size_gauge",
        "Number of entries held by a cache, including expired ones."
    );
    describe_histogram!(
        "multicall_batch_size_bucket",
        Unit::Count,
        "Number of calls sent in one aggregate request."
    );
    describe_counter!(
        "multicall_unavailable_total",
        Unit::Count,
        "Aggregate requests that failed outright or returned a mismatched result count."
    );
    describe_counter!(
        "rpc_calls_total",
        Unit::Count,
        "Individual RPC reads issued, labeled by component."
    );
    describe_counter!(
        "rpc_rate_limited_total",
        Unit::Count,
        "RPC reads rejected by provider throttling, labeled by component."
    );
    describe_counter!(
        "scheduler_task_failures_total",
        Unit::Count,
        "Scheduler tasks whose failure was isolated and dropped, labeled by job."
    );
    describe_counter!(
        "claim_scan_total_failures",
        Unit::Count,
        "Claimable scans where every per-token read failed."
    );
    describe_histogram!(
        "token_registry_enrich_duration_ms",
        Unit::Milliseconds,
        "Wall time of one allowed-token enrichment pass."
    );
}

pub fn increment_cache_hit(cache_name: &str) {
    counter!("cache_hits_total", 1, "cache" => cache_name.to_string());
}

pub fn increment_cache_miss(cache_name: &str) {
    counter!("cache_miss_total", 1, "cache" => cache_name.to_string());
}

pub fn set_cache_size(cache_name: &str, size: f64) {
    gauge!("cache_size_gauge", size, "cache" => cache_name.to_string());
}

pub fn record_multicall_batch_size(size: f64) {
    histogram!("multicall_batch_size_bucket", size);
}

pub fn increment_multicall_unavailable() {
    increment_counter!("multicall_unavailable_total");
}

pub fn increment_rpc_call(component: &str) {
    counter!("rpc_calls_total", 1, "component" => component.to_string());
}

pub fn increment_rate_limited(component: &str) {
    counter!("rpc_rate_limited_total", 1, "component" => component.to_string());
}

pub fn increment_scheduler_failure(job: &str) {
    counter!("scheduler_task_failures_total", 1, "job" => job.to_string());
}

pub fn increment_claim_scan_total_failure() {
    increment_counter!("claim_scan_total_failures");
}

pub fn record_enrich_duration(duration: std::time::Duration) {
    histogram!(
        "token_registry_enrich_duration_ms",
        duration.as_secs_f64() * 1000.0
    );
}
