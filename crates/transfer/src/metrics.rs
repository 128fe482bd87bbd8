//! Prometheus metrics for transfers and job correlation.
//!
//! Metrics live on a crate-local registry. The embedding process decides how
//! to expose them; [`encode_metrics`] renders the text exposition format.

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Registry for all transfer metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static PARTS_UPLOADED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vaultlift_parts_uploaded_total",
        "Total number of multipart parts uploaded",
    )
    .expect("metric creation failed")
});

pub static BYTES_TRANSFERRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vaultlift_bytes_transferred_total",
        "Total bytes read from the vault and uploaded",
    )
    .expect("metric creation failed")
});

pub static CHECKSUM_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vaultlift_checksum_mismatches_total",
        "Total number of tree-hash verification failures",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "vaultlift_uploads_completed_total",
        "Total number of multipart uploads finalized",
    )
    .expect("metric creation failed")
});

pub static JOB_NOTIFICATIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "vaultlift_job_notifications_total",
            "Job completion events by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static PART_UPLOAD_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "vaultlift_part_upload_duration_seconds",
            "Time taken to upload a single part",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the registry.
///
/// Idempotent; calls after the first are no-ops.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PARTS_UPLOADED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_TRANSFERRED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHECKSUM_MISMATCHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_COMPLETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOB_NOTIFICATIONS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PART_UPLOAD_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// Render the registry in the Prometheus text format.
pub fn encode_metrics() -> prometheus::Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

/// Helper to count a job completion event by outcome.
pub fn record_notification(outcome: &str) {
    JOB_NOTIFICATIONS.with_label_values(&[outcome]).inc();
}
