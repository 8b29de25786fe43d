//! Prometheus metrics for the sync engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Files written to the index.
pub static FILES_UPSERTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docsync_files_upserted_total", "Files upserted into the index")
        .unwrap()
});

/// Files removed from the index.
pub static FILES_DELETED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docsync_files_deleted_total", "Files deleted from the index").unwrap()
});

/// Chunk records written.
pub static CHUNKS_WRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("docsync_chunks_written_total", "Chunk records written").unwrap()
});

/// Per-file sync failures by error kind.
pub static SYNC_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "docsync_sync_failures_total",
        "Per-file sync failures",
        &["kind"]
    )
    .unwrap()
});

/// Duration of a full worker tick.
pub static SYNC_CYCLE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "docsync_sync_cycle_duration_seconds",
        "Duration of one sync cycle in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]
    )
    .unwrap()
});

/// Document records in the index after the last cycle.
pub static INDEXED_DOCUMENTS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("docsync_indexed_documents", "Documents currently indexed").unwrap()
});

/// Changes waiting in the event buffer.
pub static PENDING_CHANGES: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "docsync_pending_changes",
        "Filesystem changes waiting for the next cycle"
    )
    .unwrap()
});

/// Register all metrics (call once at startup).
pub fn init_metrics() {
    let _ = &*FILES_UPSERTED;
    let _ = &*FILES_DELETED;
    let _ = &*CHUNKS_WRITTEN;
    let _ = &*SYNC_FAILURES;
    let _ = &*SYNC_CYCLE_DURATION;
    let _ = &*INDEXED_DOCUMENTS;
    let _ = &*PENDING_CHANGES;

    tracing::debug!("Prometheus metrics initialized");
}

/// Count a per-file failure.
pub fn record_failure(kind: &str) {
    SYNC_FAILURES.with_label_values(&[kind]).inc();
}

/// Current metrics in the Prometheus text format.
#[must_use]
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    if let Err(e) = TextEncoder::new().encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
