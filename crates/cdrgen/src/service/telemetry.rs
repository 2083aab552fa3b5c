//! # Telemetry Features
//!
//! Console logging through `tracing-subscriber` is always on. Setting
//! `--log-dir` adds a daily-rotated log file written through a non-blocking
//! `tracing-appender` worker. OpenTelemetry export is opt-in.
//!
//! ## Feature matrix
//!
//! - `traces`: Exports request spans through OpenTelemetry.
//! - `metrics`: Enables OpenTelemetry metrics (request counters, task
//!   failures, request duration).
//! - `stdout`: Enables the stdout exporter for whichever of the above is on.
//!
//! ## Span behavior
//!
//! - Every request runs inside `info_span!("request", id, kind, count)`; task
//!   events inherit it.
//! - Events outside of a span are only shown in log output.
//!
//! ## Example usage
//!
//! ```bash
//! cargo run --bin cdrgen --features metrics,stdout -- --daemon
//! ```

// Disallow using `stdout` without `traces` or `metrics`
#[cfg(all(feature = "stdout", not(any(feature = "traces", feature = "metrics"))))]
compile_error!(
    "The 'stdout' feature requires at least one of 'traces' or 'metrics' to be enabled."
);

use crate::service::config::{LogConfig, LogFile};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "metrics")]
use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};
#[cfg(feature = "metrics")]
use opentelemetry_sdk::metrics as sdkmetrics;
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry::{InstrumentationScope, KeyValue};
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_sdk::Resource;
#[cfg(any(feature = "metrics", feature = "traces"))]
use opentelemetry_semantic_conventions as semvcns;

#[cfg(feature = "traces")]
use opentelemetry::trace::TracerProvider;
#[cfg(feature = "traces")]
use opentelemetry_sdk::trace as sdktrace;

pub struct TelemetryProviders {
    /// Flushes the log file when dropped.
    pub log_guard: Option<WorkerGuard>,
    #[cfg(feature = "traces")]
    pub tracer_provider: Option<sdktrace::SdkTracerProvider>,
    #[cfg(feature = "metrics")]
    pub meter_provider: Option<sdkmetrics::SdkMeterProvider>,
}

impl TelemetryProviders {
    /// Flushes and stops the exporters. Safe to call when none are enabled.
    pub fn shutdown(self) {
        #[cfg(feature = "traces")]
        if let Some(provider) = self.tracer_provider {
            if let Err(err) = provider.force_flush() {
                eprintln!("Error flushing traces: {err:#?}");
            }
            if let Err(err) = provider.shutdown() {
                eprintln!("Error shutting down tracer: {err:#?}");
            }
        }

        #[cfg(feature = "metrics")]
        if let Some(provider) = self.meter_provider {
            if let Err(err) = provider.force_flush() {
                eprintln!("Error flushing metrics: {err:#?}");
            }
            if let Err(err) = provider.shutdown() {
                eprintln!("Error shutting down meter: {err:#?}");
            }
        }

        drop(self.log_guard);
    }
}

/// Installs the global subscriber.
///
/// `RUST_LOG` takes precedence over `log.level`.
///
/// # Errors
///
/// Fails if the filter does not parse or a subscriber is already installed.
pub fn init_telemetry(log: &LogConfig) -> anyhow::Result<TelemetryProviders> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&log.level)?,
    };

    let (file_writer, log_guard) = match &log.file {
        Some(file) => {
            let (writer, guard) = rolling_file_writer(file);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    #[cfg(any(feature = "metrics", feature = "traces"))]
    let scope = InstrumentationScope::builder("cdrgen")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_schema_url(semvcns::SCHEMA_URL)
        .build();

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(log.json.then(|| {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
        }))
        .with((!log.json).then(|| {
            fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty()
        }))
        .with(file_writer.map(|writer| {
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_timer(fmt::time::ChronoLocal::rfc_3339())
        }));

    #[cfg(feature = "traces")]
    let (registry, tracer_provider) = {
        let tracer_provider = init_tracer();
        opentelemetry::global::set_tracer_provider(tracer_provider.clone());
        let registry = registry.with(
            tracing_opentelemetry::layer()
                .with_tracer(tracer_provider.tracer_with_scope(scope.clone()))
                .with_error_records_to_exceptions(true),
        );
        (registry, Some(tracer_provider))
    };

    #[cfg(feature = "metrics")]
    let (registry, meter_provider) = {
        let meter_provider = init_metrics();
        opentelemetry::global::set_meter_provider(meter_provider.clone());
        init_metric_handles(opentelemetry::global::meter_with_scope(scope));
        let registry = registry.with(tracing_opentelemetry::MetricsLayer::new(
            meter_provider.clone(),
        ));
        (registry, Some(meter_provider))
    };

    registry.try_init()?;

    Ok(TelemetryProviders {
        log_guard,
        #[cfg(feature = "traces")]
        tracer_provider,
        #[cfg(feature = "metrics")]
        meter_provider,
    })
}

/// Daily-rotated `<dir>/<name>.<date>` behind a background writer thread.
/// Lines still buffered are flushed when the guard drops.
fn rolling_file_writer(file: &LogFile) -> (NonBlocking, WorkerGuard) {
    let appender = tracing_appender::rolling::daily(&file.dir, &file.name);
    tracing_appender::non_blocking(appender)
}

#[cfg(any(feature = "metrics", feature = "traces"))]
fn resource() -> Resource {
    Resource::builder()
        .with_service_name("cdrgen")
        .with_schema_url(
            [KeyValue::new(
                semvcns::resource::SERVICE_VERSION,
                env!("CARGO_PKG_VERSION"),
            )],
            semvcns::SCHEMA_URL,
        )
        .build()
}

#[cfg(feature = "metrics")]
fn init_metrics() -> sdkmetrics::SdkMeterProvider {
    let builder = sdkmetrics::SdkMeterProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::MetricExporter;
        let exporter = MetricExporter::default();
        let reader = sdkmetrics::PeriodicReader::builder(exporter)
            .with_interval(std::time::Duration::from_secs(5))
            .build();

        builder.with_reader(reader)
    };

    builder.build()
}

#[cfg(feature = "traces")]
fn init_tracer() -> sdktrace::SdkTracerProvider {
    let builder = sdktrace::SdkTracerProvider::builder().with_resource(resource());

    #[cfg(feature = "stdout")]
    let builder = {
        use opentelemetry_stdout::SpanExporter;
        let batch = sdktrace::BatchSpanProcessor::builder(SpanExporter::default())
            .with_batch_config(
                sdktrace::BatchConfigBuilder::default()
                    .with_scheduled_delay(std::time::Duration::from_secs(5))
                    .with_max_queue_size(2048)
                    .build(),
            )
            .build();
        builder.with_span_processor(batch)
    };

    builder.build()
}

// Metric handles - only compiled when metrics feature is enabled
#[cfg(feature = "metrics")]
static REQUESTS: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUESTS_REJECTED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUESTS_INFLIGHT: OnceLock<UpDownCounter<i64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static REQUEST_DURATION_MS: OnceLock<Histogram<f64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static RECORDS_PUBLISHED: OnceLock<Counter<u64>> = OnceLock::new();
#[cfg(feature = "metrics")]
static TASK_FAILURES: OnceLock<Counter<u64>> = OnceLock::new();

#[cfg(feature = "metrics")]
fn init_metric_handles(meter: Meter) {
    let _ = REQUESTS.set(
        meter
            .u64_counter("requests")
            .with_description("Generation requests consumed")
            .build(),
    );

    let _ = REQUESTS_REJECTED.set(
        meter
            .u64_counter("requests_rejected")
            .with_description("Requests rejected, malformed or failed")
            .build(),
    );

    let _ = REQUESTS_INFLIGHT.set(
        meter
            .i64_up_down_counter("requests_inflight")
            .with_description("Requests whose records are still being produced")
            .build(),
    );

    let _ = REQUEST_DURATION_MS.set(
        meter
            .f64_histogram("request_duration")
            .with_unit("ms")
            .with_description("Time from dispatch to settlement")
            .build(),
    );

    let _ = RECORDS_PUBLISHED.set(
        meter
            .u64_counter("records_published")
            .with_description("UDRs published to the record queue")
            .build(),
    );

    let _ = TASK_FAILURES.set(
        meter
            .u64_counter("task_failures")
            .with_description("Generation tasks that failed to publish")
            .build(),
    );
}

// Convenience functions that compile to no-ops when metrics are disabled
#[cfg(feature = "metrics")]
pub fn increment_requests() {
    if let Some(counter) = REQUESTS.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests() {}

#[cfg(feature = "metrics")]
pub fn increment_requests_rejected() {
    if let Some(counter) = REQUESTS_REJECTED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests_rejected() {}

#[cfg(feature = "metrics")]
pub fn increment_requests_inflight() {
    if let Some(counter) = REQUESTS_INFLIGHT.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_requests_inflight() {}

#[cfg(feature = "metrics")]
pub fn decrement_requests_inflight() {
    if let Some(counter) = REQUESTS_INFLIGHT.get() {
        counter.add(-1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn decrement_requests_inflight() {}

#[cfg(feature = "metrics")]
pub fn record_request_duration(duration_ms: f64) {
    if let Some(histogram) = REQUEST_DURATION_MS.get() {
        histogram.record(duration_ms, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn record_request_duration(_duration_ms: f64) {}

#[cfg(feature = "metrics")]
pub fn increment_records_published() {
    if let Some(counter) = RECORDS_PUBLISHED.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_records_published() {}

#[cfg(feature = "metrics")]
pub fn increment_task_failures() {
    if let Some(counter) = TASK_FAILURES.get() {
        counter.add(1, &[]);
    }
}

#[cfg(not(feature = "metrics"))]
pub fn increment_task_failures() {}
