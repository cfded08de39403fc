// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the cache service.
//!
//! Uses the `metrics` crate for backend-agnostic collection; the embedding
//! application chooses the exporter.
//!
//! # Metric Naming Convention
//! - `fmw_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `dataset`: `<group>/<feature>`
//! - `status`: success, not_modified, fetch_error, parse_error, storage_error
//! - `action`: created, updated, removed

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Record the outcome of one sync cycle.
pub fn record_sync(dataset: &str, status: &str) {
    counter!(
        "fmw_cache_sync_total",
        "dataset" => dataset.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record sync cycle latency.
pub fn record_sync_latency(dataset: &str, duration: Duration) {
    histogram!(
        "fmw_cache_sync_seconds",
        "dataset" => dataset.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record detected changes by action.
pub fn record_changes(action: &str, count: usize) {
    counter!(
        "fmw_cache_changes_total",
        "action" => action.to_string()
    )
    .increment(count as u64);
}

/// Set the current number of retained change-log entries.
pub fn set_changelog_entries(count: usize) {
    gauge!("fmw_cache_changelog_entries").set(count as f64);
}

/// Set the current snapshot row count for a dataset.
pub fn set_snapshot_rows(dataset: &str, rows: usize) {
    gauge!(
        "fmw_cache_snapshot_rows",
        "dataset" => dataset.to_string()
    )
    .set(rows as f64);
}
