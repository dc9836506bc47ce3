//! Settings resolution.
//!
//! Every setting resolves independently: an explicit [`RegisterConfig`] field
//! wins over the matching `OTEL_*` environment variable, which wins over the
//! built-in default. The result is a [`ResolvedConfig`], validated once and
//! consumed by the pipeline builders.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::error::{InvalidValue, RegisterError};
use crate::instrumentation::InstrumentationSet;

/// Collector endpoint used when neither the caller nor the environment names one.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4317";

/// Service name used when neither the caller nor the environment names one.
pub const UNKNOWN_SERVICE: &str = "unknown-service";

/// Per-export timeout used when the caller does not set one.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval of the periodic metric reader.
pub const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Enumerated settings
// ---------------------------------------------------------------------------

/// OTLP payload compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Compression {
    Gzip,
    #[default]
    None,
}

impl Compression {
    /// The exporter's compression argument; `None` means "do not pass one".
    pub fn to_otlp(self) -> Option<opentelemetry_otlp::Compression> {
        match self {
            Compression::Gzip => Some(opentelemetry_otlp::Compression::Gzip),
            Compression::None => None,
        }
    }
}

impl FromStr for Compression {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            "none" | "" => Ok(Compression::None),
            _ => Err(InvalidValue::new("compression", s)),
        }
    }
}

/// Verbosity of the diagnostic log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogLevel {
    Off,
    #[default]
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = InvalidValue;

    /// Accepts the `OTEL_LOG_LEVEL` vocabulary (`none`, `verbose`, `all`) as
    /// well as the usual `tracing` level names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "off" => Ok(LogLevel::Off),
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "verbose" | "trace" | "all" => Ok(LogLevel::Trace),
            _ => Err(InvalidValue::new("log level", s)),
        }
    }
}

/// Where diagnostic logs go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum LogOutput {
    /// JSON lines on stdout.
    #[default]
    Console,
    /// No diagnostic log layer.
    None,
}

impl FromStr for LogOutput {
    type Err = InvalidValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" | "logging" => Ok(LogOutput::Console),
            "none" => Ok(LogOutput::None),
            _ => Err(InvalidValue::new("logs exporter", s)),
        }
    }
}

macro_rules! try_from_string {
    ($($ty:ty),*) => {$(
        impl TryFrom<String> for $ty {
            type Error = InvalidValue;

            fn try_from(value: String) -> Result<Self, InvalidValue> {
                value.parse()
            }
        }
    )*};
}

try_from_string!(Compression, LogLevel, LogOutput);

// ---------------------------------------------------------------------------
// Caller input
// ---------------------------------------------------------------------------

/// Explicit settings passed to [`register`](crate::register()).
///
/// Unset optional fields fall back to the environment, then to defaults.
/// Deserialisable so applications can embed it in their own configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterConfig {
    /// OTLP collector endpoint (`OTEL_EXPORTER_OTLP_ENDPOINT`).
    #[serde(default)]
    pub endpoint: Option<String>,

    /// `service.name` resource attribute (`OTEL_SERVICE_NAME`).
    #[serde(default)]
    pub service_name: Option<String>,

    /// Instrumentation names to enable. **Required**, at least one.
    pub instruments: Vec<String>,

    /// Log verbosity (`OTEL_LOG_LEVEL`). Filters the whole JSON log layer,
    /// application events included.
    #[serde(default)]
    pub log_level: Option<LogLevel>,

    /// Diagnostic log destination (`OTEL_LOGS_EXPORTER`).
    #[serde(default)]
    pub log_output: Option<LogOutput>,

    /// Export compression (`OTEL_EXPORTER_OTLP_COMPRESSION`).
    #[serde(default)]
    pub compression: Option<Compression>,

    /// Extra resource attributes.
    #[serde(default)]
    pub custom_attributes: BTreeMap<String, String>,

    /// Also export metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    /// Per-export timeout in milliseconds.
    #[serde(default)]
    pub export_timeout_ms: Option<u64>,

    /// Shut down and exit on SIGTERM / SIGINT.
    #[serde(default = "default_handle_signals")]
    pub handle_signals: bool,

    /// Install the meter provider as the process-wide default.
    #[serde(default)]
    pub install_global_meter_provider: bool,
}

fn default_handle_signals() -> bool {
    true
}

impl RegisterConfig {
    /// Start from a list of instrumentation names with everything else unset.
    pub fn new<I, S>(instruments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint: None,
            service_name: None,
            instruments: instruments.into_iter().map(Into::into).collect(),
            log_level: None,
            log_output: None,
            compression: None,
            custom_attributes: BTreeMap::new(),
            enable_metrics: false,
            export_timeout_ms: None,
            handle_signals: default_handle_signals(),
            install_global_meter_provider: false,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn with_log_output(mut self, output: LogOutput) -> Self {
        self.log_output = Some(output);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    pub fn with_export_timeout(mut self, timeout: Duration) -> Self {
        self.export_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    pub fn with_global_meter_provider(mut self, enabled: bool) -> Self {
        self.install_global_meter_provider = enabled;
        self
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// The recognised `OTEL_*` variables, unparsed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvSettings {
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`
    #[serde(default)]
    pub exporter_otlp_endpoint: Option<String>,

    /// `OTEL_EXPORTER_OTLP_COMPRESSION`
    #[serde(default)]
    pub exporter_otlp_compression: Option<String>,

    /// `OTEL_SERVICE_NAME`
    #[serde(default)]
    pub service_name: Option<String>,

    /// `OTEL_LOGS_EXPORTER`
    #[serde(default)]
    pub logs_exporter: Option<String>,

    /// `OTEL_LOG_LEVEL`
    #[serde(default)]
    pub log_level: Option<String>,
}

impl EnvSettings {
    /// Read the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the environment source cannot be deserialised.
    pub fn from_env() -> Result<Self, RegisterError> {
        Self::load(None)
    }

    /// Read from an explicit variable map instead of the process environment.
    ///
    /// Keys are full variable names such as `OTEL_SERVICE_NAME`.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, RegisterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self::load(Some(map))
    }

    fn load(source: Option<HashMap<String, String>>) -> Result<Self, RegisterError> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix("OTEL").source(source))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Effective, validated settings for one registration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub service_name: String,
    /// Validated, normalised `http`/`https` endpoint.
    pub endpoint: String,
    pub compression: Compression,
    pub instrumentations: InstrumentationSet,
    pub custom_attributes: BTreeMap<String, String>,
    pub enable_metrics: bool,
    pub log_level: LogLevel,
    pub log_output: LogOutput,
    pub export_timeout: Duration,
    pub handle_signals: bool,
    pub install_global_meter_provider: bool,
    /// Problems worth telling the operator about once logging is up.
    pub warnings: Vec<String>,
}

impl ResolvedConfig {
    /// Merge explicit settings over the environment and validate the result.
    ///
    /// # Errors
    ///
    /// - [`RegisterError::MissingEndpoint`] if the winning endpoint is blank.
    /// - [`RegisterError::NoInstruments`] if `instruments` is empty.
    /// - [`RegisterError::InvalidEndpoint`] / [`RegisterError::InvalidProtocol`]
    ///   if the endpoint is not an `http(s)` URL.
    /// - [`RegisterError::InvalidValue`] for unparsable environment values.
    pub fn resolve(config: RegisterConfig, env: EnvSettings) -> Result<Self, RegisterError> {
        let endpoint = config
            .endpoint
            .or(env.exporter_otlp_endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned());
        let endpoint = validate_endpoint(&endpoint)?;

        if config.instruments.is_empty() {
            return Err(RegisterError::NoInstruments);
        }

        let mut warnings = Vec::new();

        let (instrumentations, unknown) = InstrumentationSet::select(&config.instruments);
        for name in unknown {
            warnings.push(format!("ignoring unrecognised instrumentation {name:?}"));
        }

        let service_name = match non_blank(config.service_name).or(non_blank(env.service_name)) {
            Some(name) => name,
            None => {
                warnings.push(format!(
                    "no service name configured; reporting as {UNKNOWN_SERVICE:?}"
                ));
                UNKNOWN_SERVICE.to_owned()
            }
        };

        let compression = pick(config.compression, env.exporter_otlp_compression.as_deref())?;
        let log_level = pick(config.log_level, env.log_level.as_deref())?;
        let log_output = pick(config.log_output, env.logs_exporter.as_deref())?;

        let export_timeout = config
            .export_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_EXPORT_TIMEOUT);

        Ok(Self {
            service_name,
            endpoint,
            compression,
            instrumentations,
            custom_attributes: config.custom_attributes,
            enable_metrics: config.enable_metrics,
            log_level,
            log_output,
            export_timeout,
            handle_signals: config.handle_signals,
            install_global_meter_provider: config.install_global_meter_provider,
            warnings,
        })
    }
}

impl fmt::Display for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service={} endpoint={} instruments=[{}] compression={:?} metrics={}",
            self.service_name,
            self.endpoint,
            self.instrumentations.names(),
            self.compression,
            self.enable_metrics
        )
    }
}

/// Explicit value, else parsed environment value, else the type's default.
fn pick<T>(explicit: Option<T>, env: Option<&str>) -> Result<T, InvalidValue>
where
    T: FromStr<Err = InvalidValue> + Default,
{
    match (explicit, env) {
        (Some(v), _) => Ok(v),
        (None, Some(raw)) => raw.parse(),
        (None, None) => Ok(T::default()),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Check that `raw` is a non-empty `http` or `https` URL and return it in
/// normalised form. A bare root path is returned without its trailing slash.
pub fn validate_endpoint(raw: &str) -> Result<String, RegisterError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RegisterError::MissingEndpoint);
    }
    let url = Url::parse(trimmed).map_err(|source| RegisterError::InvalidEndpoint {
        endpoint: trimmed.to_owned(),
        source,
    })?;
    match url.scheme() {
        "http" | "https" => {
            let normalised = url.as_str();
            if url.path() == "/" && url.query().is_none() && url.fragment().is_none() {
                Ok(normalised.trim_end_matches('/').to_owned())
            } else {
                Ok(normalised.to_owned())
            }
        }
        other => Err(RegisterError::InvalidProtocol {
            scheme: other.to_owned(),
        }),
    }
}
