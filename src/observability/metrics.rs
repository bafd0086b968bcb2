//! OpenTelemetry metrics for the batched writer.
//!
//! Key metrics:
//! - batchwrite_requests_total: Counter of submitted writes, by mode
//! - batchwrite_batches_total: Counter of resolved batches, by outcome
//! - batchwrite_batch_size: Histogram of requests per unit of work
//! - batchwrite_batch_latency_seconds: Histogram of apply + commit time
//! - batchwrite_wait_timeouts_total: Counter of callers that gave up waiting

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Batchwrite metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Total number of submitted writes.
    pub requests_total: Counter<u64>,
    /// Total number of resolved batches.
    pub batches_total: Counter<u64>,
    /// Histogram of batch sizes.
    pub batch_size: Histogram<u64>,
    /// Histogram of batch latency in seconds.
    pub batch_latency: Histogram<f64>,
    /// Total number of synchronous waits that timed out.
    pub wait_timeouts_total: Counter<u64>,
}

impl Metrics {
    /// Create a new metrics registry from a meter.
    fn new(meter: &Meter) -> Self {
        Self {
            requests_total: meter
                .u64_counter("batchwrite_requests_total")
                .with_description("Total number of submitted writes")
                .with_unit("1")
                .init(),
            batches_total: meter
                .u64_counter("batchwrite_batches_total")
                .with_description("Total number of batches committed or aborted")
                .with_unit("1")
                .init(),
            batch_size: meter
                .u64_histogram("batchwrite_batch_size")
                .with_description("Requests applied per unit of work")
                .with_unit("1")
                .init(),
            batch_latency: meter
                .f64_histogram("batchwrite_batch_latency_seconds")
                .with_description("Time to apply and resolve one unit of work")
                .with_unit("s")
                .init(),
            wait_timeouts_total: meter
                .u64_counter("batchwrite_wait_timeouts_total")
                .with_description("Synchronous callers that stopped waiting")
                .with_unit("1")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// This should be called once at startup. Subsequent calls are ignored.
///
/// # Arguments
///
/// * `otel_endpoint` - Optional OTLP endpoint for metrics export
pub fn init_metrics_with_endpoint(otel_endpoint: Option<&str>) {
    METRICS.get_or_init(|| {
        if let Some(endpoint) = otel_endpoint {
            // Use OTLP exporter when endpoint is configured
            use opentelemetry_otlp::{Protocol, WithExportConfig};

            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint)
                .with_protocol(Protocol::Grpc);

            match opentelemetry_otlp::new_pipeline()
                .metrics(opentelemetry_sdk::runtime::Tokio)
                .with_exporter(exporter)
                .with_period(std::time::Duration::from_secs(10))
                .build()
            {
                Ok(provider) => {
                    global::set_meter_provider(provider);
                    tracing::info!(endpoint, "OTLP metrics exporter configured");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create OTLP exporter, using no-op metrics");
                    set_manual_provider();
                }
            }
        } else {
            // Metrics are recorded but not exported
            set_manual_provider();
        }

        let meter = global::meter("batchwrite");
        Metrics::new(&meter)
    });
}

fn set_manual_provider() {
    let reader = ManualReader::builder().build();
    let provider = SdkMeterProvider::builder().with_reader(reader).build();
    global::set_meter_provider(provider);
}

/// Initialize the metrics system without OTLP export.
pub fn init_metrics() {
    init_metrics_with_endpoint(None);
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

/// Record a submitted write.
pub fn record_request(mode: &'static str) {
    if let Some(m) = METRICS.get() {
        m.requests_total.add(1, &[KeyValue::new("mode", mode)]);
    }
}

/// Record a resolved batch.
pub fn record_batch(size: usize, latency_seconds: f64, committed: bool) {
    if let Some(m) = METRICS.get() {
        let attrs = [KeyValue::new(
            "outcome",
            if committed { "committed" } else { "aborted" },
        )];
        m.batches_total.add(1, &attrs);
        m.batch_size.record(size as u64, &attrs);
        m.batch_latency.record(latency_seconds, &attrs);
    }
}

/// Record a synchronous caller giving up.
pub fn record_wait_timeout() {
    if let Some(m) = METRICS.get() {
        m.wait_timeouts_total.add(1, &[]);
    }
}
