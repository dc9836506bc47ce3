//! The [`register`] entry point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use opentelemetry::global;
use tokio::runtime::Handle;
use tracing::subscriber::NoSubscriber;
use tracing::{debug, error, info, warn};
use tracing_subscriber::fmt::MakeWriter;

use crate::config::{EnvSettings, RegisterConfig, ResolvedConfig};
use crate::error::RegisterError;
use crate::exporter;
use crate::guard::{SdkPipelines, ShutdownTarget as _, TelemetryGuard};
use crate::init;
use crate::signal::{self, Termination};

/// Set while a registration holds the process-wide pipelines.
static REGISTERED: AtomicBool = AtomicBool::new(false);

/// Resolve settings from `config` and the process environment, then build and
/// start the telemetry pipelines.
///
/// Must be called from within a Tokio runtime. Succeeds at most once per
/// process; later calls return [`RegisterError::AlreadyRegistered`].
///
/// Side effects on success:
/// - the OTLP trace pipeline becomes the global tracer provider;
/// - a global `tracing` subscriber is installed;
/// - SDK errors are routed into `tracing`;
/// - with `install_global_meter_provider`, the meter provider becomes global;
/// - with `handle_signals`, a task is spawned that shuts down and exits the
///   process on SIGTERM / SIGINT.
///
/// The installed subscriber is the process-wide `tracing` sink. Its JSON log
/// layer is filtered by the resolved log level (default `error`), so the
/// level also applies to the application's own events. Set a log level
/// explicitly, or via `OTEL_LOG_LEVEL`, to see application `info!` output.
///
/// # Errors
///
/// Any validation or construction failure is logged and returned; nothing is
/// left half-installed. When no subscriber exists yet, the failure is
/// written as a JSON line to stderr.
pub fn register(config: RegisterConfig) -> Result<TelemetryGuard, RegisterError> {
    let result = EnvSettings::from_env().and_then(|env| register_with_env(config, env));
    if let Err(e) = &result {
        report_failure(e, std::io::stderr);
    }
    result
}

/// Log a registration failure through the current subscriber, or through a
/// one-off JSON subscriber writing to `fallback` when there is none.
fn report_failure<W>(e: &RegisterError, fallback: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let has_subscriber = tracing::dispatcher::get_default(|d| !d.is::<NoSubscriber>());
    if has_subscriber {
        error!(error = %e, "Error in register function");
        return;
    }
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_writer(fallback)
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        error!(error = %e, "Error in register function");
    });
}

/// [`register`] with an explicit environment instead of the process one.
pub fn register_with_env(
    config: RegisterConfig,
    env: EnvSettings,
) -> Result<TelemetryGuard, RegisterError> {
    let handle = Handle::try_current().map_err(|_| RegisterError::NoRuntime)?;
    let resolved = ResolvedConfig::resolve(config, env)?;

    if REGISTERED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(RegisterError::AlreadyRegistered);
    }

    start(resolved, &handle).map_err(|e| {
        REGISTERED.store(false, Ordering::SeqCst);
        e
    })
}

fn start(cfg: ResolvedConfig, handle: &Handle) -> Result<TelemetryGuard, RegisterError> {
    let termination = cfg.handle_signals.then(Termination::listen).transpose()?;

    let resource = exporter::service_resource(&cfg);
    let tracer = init::install_tracer(&cfg, resource.clone())?;
    let tracer_provider = tracer.provider();

    let meter_provider = if cfg.enable_metrics {
        match init::build_meter_provider(&cfg, resource) {
            Ok(provider) => Some(provider),
            Err(e) => {
                discard(handle, SdkPipelines::new(tracer_provider, None));
                return Err(e.into());
            }
        }
    } else {
        None
    };

    if cfg.install_global_meter_provider {
        if let Some(provider) = &meter_provider {
            global::set_meter_provider(provider.clone());
        }
    }

    let pipelines = SdkPipelines::new(tracer_provider, meter_provider);
    if let Err(e) = init::install_subscriber(&cfg, tracer) {
        discard(handle, pipelines);
        return Err(e);
    }

    if let Err(e) = init::route_sdk_errors() {
        warn!(error = %e, "could not route OpenTelemetry SDK errors into tracing");
    }
    for warning in &cfg.warnings {
        warn!("{warning}");
    }
    debug!(settings = %cfg, "resolved telemetry settings");

    let guard = TelemetryGuard::new(Arc::new(pipelines), cfg.instrumentations.clone());
    if let Some(termination) = termination {
        signal::spawn_exit_on_signal(handle, termination, guard.shutdown_target());
    }

    info!(
        service_name = %cfg.service_name,
        endpoint = %cfg.endpoint,
        instrumentations = %cfg.instrumentations.names(),
        compression = ?cfg.compression,
        metrics = cfg.enable_metrics,
        "OpenTelemetry SDK started successfully"
    );
    Ok(guard)
}

/// Tear down pipelines from a failed registration without blocking the
/// runtime thread.
fn discard(handle: &Handle, pipelines: SdkPipelines) {
    handle.spawn_blocking(move || {
        if let Err(e) = pipelines.shutdown() {
            error!(error = %e, "failed to discard partially built telemetry pipelines");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    #[test]
    fn requires_a_runtime() {
        let cfg = RegisterConfig::new(["http"]).with_endpoint("http://localhost:4317");
        assert!(matches!(
            register_with_env(cfg, EnvSettings::default()),
            Err(RegisterError::NoRuntime)
        ));
    }

    #[tokio::test]
    async fn validation_failure_does_not_claim_registration() {
        let cfg = RegisterConfig::new(["http"]).with_endpoint("ftp://host");
        assert!(matches!(
            register_with_env(cfg, EnvSettings::default()),
            Err(RegisterError::InvalidProtocol { .. })
        ));
        assert!(!REGISTERED.load(Ordering::SeqCst));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn failure_is_logged_without_a_subscriber() {
        let captured = Captured::default();
        let writer = captured.clone();
        report_failure(&RegisterError::MissingEndpoint, move || writer.clone());

        let line = captured.text();
        assert!(line.contains("Error in register function"), "{line}");
        assert!(line.contains("Endpoint is required"), "{line}");
        let json: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(json["level"], "ERROR");
    }

    #[test]
    fn failure_goes_to_an_existing_subscriber() {
        let app_log = Captured::default();
        let fallback = Captured::default();
        let writer = app_log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .finish();
        let fallback_writer = fallback.clone();
        tracing::subscriber::with_default(subscriber, || {
            report_failure(&RegisterError::NoInstruments, move || fallback_writer.clone());
        });

        assert!(app_log.text().contains("At least one instrument must be specified"));
        assert!(fallback.text().is_empty());
    }

    #[tokio::test]
    async fn empty_endpoint_fails_before_any_pipeline() {
        let cfg = RegisterConfig::new(["http"]).with_endpoint("");
        assert!(matches!(
            register_with_env(cfg, EnvSettings::default()),
            Err(RegisterError::MissingEndpoint)
        ));
        assert!(!REGISTERED.load(Ordering::SeqCst));
    }
}
