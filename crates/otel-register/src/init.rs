//! OTEL SDK initialisation: OTLP trace pipeline, optional metrics pipeline,
//! and the global tracing subscriber.

use opentelemetry::metrics::MetricsError;
use opentelemetry::trace::TraceError;
use opentelemetry_sdk::metrics::reader::{DefaultAggregationSelector, DefaultTemporalitySelector};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::Tracer;
use opentelemetry_sdk::{runtime, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use crate::config::{LogOutput, ResolvedConfig, METRICS_EXPORT_INTERVAL};
use crate::error::RegisterError;
use crate::exporter;

/// Install the batch span pipeline and return its tracer.
///
/// The pipeline also becomes the global tracer provider.
///
/// # Errors
///
/// Returns an error if the exporter or batch processor cannot be built.
pub fn install_tracer(cfg: &ResolvedConfig, resource: Resource) -> Result<Tracer, TraceError> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(exporter::tonic_exporter(cfg))
        .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(resource))
        .install_batch(runtime::Tokio)
}

/// Build the metrics pipeline: OTLP exporter behind a periodic reader.
///
/// Assembled from its parts rather than through the OTLP metrics pipeline,
/// which would also install the provider globally. Global installation is
/// left to the caller.
///
/// # Errors
///
/// Returns an error if the metrics exporter cannot be built.
pub fn build_meter_provider(
    cfg: &ResolvedConfig,
    resource: Resource,
) -> Result<SdkMeterProvider, MetricsError> {
    let exporter = exporter::tonic_exporter(cfg).build_metrics_exporter(
        Box::new(DefaultAggregationSelector::new()),
        Box::new(DefaultTemporalitySelector::new()),
    )?;
    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .with_timeout(cfg.export_timeout)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

/// Install the global subscriber.
///
/// Two layers, each with its own filter:
/// - a [`tracing_opentelemetry`] layer exporting spans, filtered by the
///   selected instrumentations;
/// - a JSON [`tracing_subscriber::fmt`] layer for diagnostic logs, filtered by
///   the log level and omitted entirely when the log output is `none`.
///
/// # Errors
///
/// Returns an error if the filter does not parse or a global subscriber is
/// already set.
pub fn install_subscriber(cfg: &ResolvedConfig, tracer: Tracer) -> Result<(), RegisterError> {
    let otel_layer = tracing_opentelemetry::layer()
        .with_tracer(tracer)
        .with_filter(cfg.instrumentations.env_filter()?);

    let log_layer = match cfg.log_output {
        LogOutput::Console => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .with_filter(cfg.log_level.as_filter()),
        ),
        LogOutput::None => None,
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(log_layer)
        .try_init()?;

    Ok(())
}

/// Route SDK-internal errors (export failures and the like) into `tracing`.
pub fn route_sdk_errors() -> Result<(), opentelemetry::global::Error> {
    opentelemetry::global::set_error_handler(|error| {
        tracing::error!(error = %error, "OpenTelemetry SDK error");
    })
}
