use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};
use std::sync::Once;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Ingestion Metrics
    // ============================================================================

    /// Total records ingested
    pub static ref INGEST_RECORDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_ingest_records_total", "Total records ingested"),
        &["source", "format"]
    ).expect("metric can be created");

    /// Total batches ingested
    pub static ref INGEST_BATCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_ingest_batches_total", "Total batches ingested"),
        &["source", "format"]
    ).expect("metric can be created");

    /// Batches rejected by the quality gate
    pub static ref INGEST_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_ingest_rejected_total", "Batches rejected by validation"),
        &["source"]
    ).expect("metric can be created");

    /// Processing latency by operation (ingest, query, optimize, promote)
    pub static ref OPERATION_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("lakehouse_operation_latency_seconds", "Operation latency in seconds")
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"]
    ).expect("metric can be created");

    // ============================================================================
    // Query Metrics
    // ============================================================================

    /// Total queries served
    pub static ref QUERY_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_query_total", "Total queries served"),
        &["layer"]
    ).expect("metric can be created");

    /// Partitions scanned per query
    pub static ref QUERY_PARTITIONS_SCANNED: HistogramVec = HistogramVec::new(
        HistogramOpts::new("lakehouse_query_partitions_scanned", "Partitions scanned per query")
            .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0]),
        &["layer"]
    ).expect("metric can be created");

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    /// Stored bytes per layer (recomputed from the catalog)
    pub static ref STORAGE_SIZE_BYTES: IntGaugeVec = IntGaugeVec::new(
        Opts::new("lakehouse_storage_size_bytes", "Stored bytes per layer"),
        &["layer"]
    ).expect("metric can be created");

    /// Partition count per layer
    pub static ref PARTITIONS_TOTAL: IntGaugeVec = IntGaugeVec::new(
        Opts::new("lakehouse_partitions_total", "Partition count per layer"),
        &["layer"]
    ).expect("metric can be created");

    /// Storage backend requests by operation (put, get, delete, list)
    pub static ref STORAGE_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_storage_requests_total", "Storage backend requests"),
        &["operation"]
    ).expect("metric can be created");

    /// Partitions compacted away by optimize_storage
    pub static ref COMPACTED_PARTITIONS_TOTAL: IntCounter = IntCounter::new(
        "lakehouse_compacted_partitions_total",
        "Source partitions merged by compaction"
    ).expect("metric can be created");

    /// Partitions removed by retention cleanup
    pub static ref RETENTION_REMOVED_TOTAL: IntCounter = IntCounter::new(
        "lakehouse_retention_removed_total",
        "Partitions removed by retention cleanup"
    ).expect("metric can be created");

    // ============================================================================
    // Catalog Cache Metrics
    // ============================================================================

    /// Catalog cache hits
    pub static ref CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "lakehouse_cache_hits_total",
        "Catalog cache hits"
    ).expect("metric can be created");

    /// Catalog cache misses
    pub static ref CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "lakehouse_cache_misses_total",
        "Catalog cache misses"
    ).expect("metric can be created");

    // ============================================================================
    // Streaming Metrics
    // ============================================================================

    /// Messages published to the bus
    pub static ref STREAM_PUBLISHED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_stream_published_total", "Messages published"),
        &["topic"]
    ).expect("metric can be created");

    /// Messages processed by consumers
    pub static ref STREAM_PROCESSED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_stream_processed_total", "Messages processed"),
        &["topic"]
    ).expect("metric can be created");

    /// Handler failures (isolated per message, loop continues)
    pub static ref STREAM_HANDLER_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_stream_handler_errors_total", "Stream handler failures"),
        &["topic"]
    ).expect("metric can be created");

    /// Per-message processing latency
    pub static ref STREAM_PROCESSING_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("lakehouse_stream_processing_latency_seconds", "Handler latency in seconds")
            .buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["topic"]
    ).expect("metric can be created");

    // ============================================================================
    // Error Metrics
    // ============================================================================

    /// Errors by type - every error path increments exactly one label
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("lakehouse_errors_total", "Errors by type"),
        &["error_type"]
    ).expect("metric can be created");

    /// Server uptime in seconds
    pub static ref UPTIME_SECONDS: IntGauge = IntGauge::new(
        "lakehouse_uptime_seconds",
        "Server uptime in seconds"
    ).expect("metric can be created");
}

/// Initialize the metrics registry.
/// Can be called multiple times safely (idempotent).
pub fn init() {
    INIT.call_once(|| {
        REGISTRY
            .register(Box::new(INGEST_RECORDS_TOTAL.clone()))
            .expect("ingest_records_total can be registered");
        REGISTRY
            .register(Box::new(INGEST_BATCHES_TOTAL.clone()))
            .expect("ingest_batches_total can be registered");
        REGISTRY
            .register(Box::new(INGEST_REJECTED_TOTAL.clone()))
            .expect("ingest_rejected_total can be registered");
        REGISTRY
            .register(Box::new(OPERATION_LATENCY.clone()))
            .expect("operation_latency can be registered");
        REGISTRY
            .register(Box::new(QUERY_TOTAL.clone()))
            .expect("query_total can be registered");
        REGISTRY
            .register(Box::new(QUERY_PARTITIONS_SCANNED.clone()))
            .expect("query_partitions_scanned can be registered");
        REGISTRY
            .register(Box::new(STORAGE_SIZE_BYTES.clone()))
            .expect("storage_size_bytes can be registered");
        REGISTRY
            .register(Box::new(PARTITIONS_TOTAL.clone()))
            .expect("partitions_total can be registered");
        REGISTRY
            .register(Box::new(STORAGE_REQUESTS_TOTAL.clone()))
            .expect("storage_requests_total can be registered");
        REGISTRY
            .register(Box::new(COMPACTED_PARTITIONS_TOTAL.clone()))
            .expect("compacted_partitions_total can be registered");
        REGISTRY
            .register(Box::new(RETENTION_REMOVED_TOTAL.clone()))
            .expect("retention_removed_total can be registered");
        REGISTRY
            .register(Box::new(CACHE_HITS_TOTAL.clone()))
            .expect("cache_hits_total can be registered");
        REGISTRY
            .register(Box::new(CACHE_MISSES_TOTAL.clone()))
            .expect("cache_misses_total can be registered");
        REGISTRY
            .register(Box::new(STREAM_PUBLISHED_TOTAL.clone()))
            .expect("stream_published_total can be registered");
        REGISTRY
            .register(Box::new(STREAM_PROCESSED_TOTAL.clone()))
            .expect("stream_processed_total can be registered");
        REGISTRY
            .register(Box::new(STREAM_HANDLER_ERRORS_TOTAL.clone()))
            .expect("stream_handler_errors_total can be registered");
        REGISTRY
            .register(Box::new(STREAM_PROCESSING_LATENCY.clone()))
            .expect("stream_processing_latency can be registered");
        REGISTRY
            .register(Box::new(ERRORS_TOTAL.clone()))
            .expect("errors_total can be registered");
        REGISTRY
            .register(Box::new(UPTIME_SECONDS.clone()))
            .expect("uptime_seconds can be registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        init();
        init(); // idempotent
    }

    #[test]
    fn test_ingest_counters() {
        INGEST_RECORDS_TOTAL
            .with_label_values(&["bookings", "json"])
            .inc_by(42);
        assert_eq!(
            INGEST_RECORDS_TOTAL
                .with_label_values(&["bookings", "json"])
                .get(),
            42
        );
    }

    #[test]
    fn test_layer_gauges() {
        STORAGE_SIZE_BYTES.with_label_values(&["raw"]).set(1_000_000);
        assert_eq!(STORAGE_SIZE_BYTES.with_label_values(&["raw"]).get(), 1_000_000);
    }

    #[test]
    fn test_error_counter_labels() {
        ERRORS_TOTAL.with_label_values(&["storage_read"]).inc();
        assert_eq!(ERRORS_TOTAL.with_label_values(&["storage_read"]).get(), 1);
    }
}
