//! Error types for registration and shutdown.

use opentelemetry::metrics::MetricsError;
use opentelemetry::trace::TraceError;
use thiserror::Error;

/// Everything that can abort [`register`](crate::register()).
///
/// Validation variants are returned before any pipeline is built, so a failed
/// call leaves no exporter, subscriber or signal task behind.
#[derive(Debug, Error)]
pub enum RegisterError {
    /// The resolved endpoint is empty.
    #[error("Endpoint is required")]
    MissingEndpoint,

    /// The caller asked for no instrumentation at all.
    #[error("At least one instrument must be specified")]
    NoInstruments,

    /// The endpoint is not a syntactically valid URL.
    #[error("invalid endpoint URL {endpoint:?}: {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    /// The endpoint parsed but its scheme is neither `http` nor `https`.
    #[error("Invalid endpoint protocol. Must be http or https.")]
    InvalidProtocol { scheme: String },

    /// A setting (usually from the environment) has an unsupported value.
    #[error(transparent)]
    InvalidValue(#[from] InvalidValue),

    /// The `OTEL_*` environment could not be read.
    #[error("failed to read OTEL environment: {0}")]
    Environment(#[from] config::ConfigError),

    /// `register` was called outside a Tokio runtime.
    #[error("register must be called from within a Tokio runtime")]
    NoRuntime,

    /// A previous call already registered telemetry in this process.
    #[error("OpenTelemetry is already registered in this process")]
    AlreadyRegistered,

    #[error("failed to install OTLP trace pipeline: {0}")]
    Trace(#[from] TraceError),

    #[error("failed to install OTLP metrics pipeline: {0}")]
    Metrics(#[from] MetricsError),

    #[error("invalid instrumentation filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] tracing_subscriber::util::TryInitError),

    /// The termination-signal listener could not be installed.
    #[error("failed to listen for termination signals: {0}")]
    Signal(#[from] std::io::Error),
}

/// A string setting that does not name a supported value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported {setting} {value:?}")]
pub struct InvalidValue {
    /// Human name of the setting, e.g. `"compression"`.
    pub setting: &'static str,
    /// The rejected input.
    pub value: String,
}

impl InvalidValue {
    pub(crate) fn new(setting: &'static str, value: impl Into<String>) -> Self {
        Self {
            setting,
            value: value.into(),
        }
    }
}

/// Failures while flushing and shutting down the pipelines.
///
/// These are logged by the signal path and never change the exit code.
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("failed to flush spans: {0}")]
    Flush(TraceError),

    #[error("failed to shut down meter provider: {0}")]
    Metrics(MetricsError),

    /// The blocking shutdown task panicked or was cancelled.
    #[error("shutdown task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
