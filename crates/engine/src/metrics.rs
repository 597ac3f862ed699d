//! Prometheus metrics for the upload engine.
//!
//! Exposes counters for chunk receipt and merge outcomes. Call
//! [`register_metrics`] once at startup; how `REGISTRY` is scraped is the
//! transport collaborator's concern.

use prometheus::{Histogram, HistogramOpts, IntCounter, Registry};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static CHUNKS_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_chunks_received_total",
        "Total number of chunks received",
    )
    .expect("metric creation failed")
});

pub static CHUNK_BYTES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_chunk_bytes_received_total",
        "Total chunk payload bytes received",
    )
    .expect("metric creation failed")
});

pub static MERGES_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_merges_completed_total",
        "Total number of merges completed successfully",
    )
    .expect("metric creation failed")
});

pub static MERGES_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_merges_failed_total",
        "Total number of merges that aborted",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_PURGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stitch_sessions_purged_total",
        "Total number of session temp areas purged",
    )
    .expect("metric creation failed")
});

pub static MERGE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stitch_merge_duration_seconds",
            "Time taken to merge a session into its completed file",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
    )
    .expect("metric creation failed")
});

static REGISTER: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(CHUNKS_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHUNK_BYTES_RECEIVED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MERGES_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MERGES_FAILED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(SESSIONS_PURGED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MERGE_DURATION.clone()))
            .expect("metric registration failed");
    });
}
