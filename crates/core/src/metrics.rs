//! Metrics definitions for the processor.
//!
//! This module defines all metrics used throughout the processor.
//! Metrics are collected using the `metrics` crate and can be exported
//! to Prometheus via `metrics-exporter-prometheus`.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Instant;

/// Initialize all metric descriptions.
/// Call this once at startup before any metrics are recorded.
pub fn init_metrics() {
    describe_counter!(
        "sluice_batches_processed_total",
        "Total number of batches fully processed and persisted"
    );
    describe_counter!(
        "sluice_blocks_processed_total",
        "Total number of blocks covered by persisted batches"
    );
    describe_counter!(
        "sluice_items_decoded_total",
        "Total number of items delivered to handlers, by kind"
    );
    describe_counter!(
        "sluice_unknown_schema_total",
        "Items whose fingerprint matched no known schema version"
    );
    describe_counter!(
        "sluice_fetch_retries_total",
        "Batch fetch attempts that failed and were retried"
    );
    describe_histogram!(
        "sluice_batch_duration_seconds",
        "Time taken to fetch, process and persist a batch in seconds"
    );
    describe_histogram!(
        "sluice_persist_duration_seconds",
        "Time spent in the batch transaction in seconds"
    );
    describe_gauge!(
        "sluice_last_processed_block",
        "Height of the last persisted block"
    );
}

/// Record an unmatched schema fingerprint.
pub fn record_unknown_schema(kind: &str) {
    counter!("sluice_unknown_schema_total", "kind" => kind.to_string()).increment(1);
}

/// Record items of one kind handed to handlers.
pub fn record_items(kind: &str, count: u64) {
    counter!("sluice_items_decoded_total", "kind" => kind.to_string()).increment(count);
}

/// Record a persisted batch.
///
/// # Arguments
/// * `blocks` - Number of blocks in the batch
/// * `last_block` - Height of the last block in the batch
pub fn record_batch_processed(blocks: u64, last_block: u64) {
    counter!("sluice_batches_processed_total").increment(1);
    counter!("sluice_blocks_processed_total").increment(blocks);
    gauge!("sluice_last_processed_block").set(last_block as f64);
}

/// Record a failed fetch attempt that will be retried.
pub fn record_fetch_retry() {
    counter!("sluice_fetch_retries_total").increment(1);
}

/// A timer that records into a histogram when dropped.
pub struct ProcessingTimer {
    start: Instant,
    histogram: &'static str,
}

impl ProcessingTimer {
    /// Start a batch timer.
    pub fn new() -> Self {
        Self::for_histogram("sluice_batch_duration_seconds")
    }

    pub fn for_histogram(histogram: &'static str) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for ProcessingTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessingTimer {
    fn drop(&mut self) {
        histogram!(self.histogram).record(self.elapsed_secs());
    }
}
