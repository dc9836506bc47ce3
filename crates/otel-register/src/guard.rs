//! Pipeline lifecycle: the [`TelemetryGuard`] handle and the shutdown seam.
//!
//! SDK shutdown blocks on the batch processor and the periodic reader, both
//! of which run on the Tokio runtime. Shutdown therefore always runs on the
//! blocking pool via [`run_shutdown`], never on a runtime worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::TracerProvider;
use tracing::debug;

use crate::error::ShutdownError;
use crate::instrumentation::InstrumentationSet;

/// Something that can flush and shut down telemetry pipelines.
#[cfg_attr(test, mockall::automock)]
pub trait ShutdownTarget: Send + Sync {
    /// Flush and shut down. Blocking.
    fn shutdown(&self) -> Result<(), ShutdownError>;
}

/// Run `target.shutdown()` on the blocking pool.
///
/// # Errors
///
/// Returns the target's error, or [`ShutdownError::Join`] if the blocking
/// task panicked.
pub async fn run_shutdown(target: Arc<dyn ShutdownTarget>) -> Result<(), ShutdownError> {
    tokio::task::spawn_blocking(move || target.shutdown()).await?
}

// ---------------------------------------------------------------------------
// SDK pipelines
// ---------------------------------------------------------------------------

/// The live SDK providers created by one registration.
///
/// Shared between the [`TelemetryGuard`] and the signal task; whichever asks
/// first performs the shutdown, later calls are no-ops.
pub(crate) struct SdkPipelines {
    tracer_provider: Mutex<Option<TracerProvider>>,
    meter_provider: Mutex<Option<Arc<SdkMeterProvider>>>,
    shut_down: AtomicBool,
}

impl SdkPipelines {
    pub(crate) fn new(
        tracer_provider: Option<TracerProvider>,
        meter_provider: Option<SdkMeterProvider>,
    ) -> Self {
        Self {
            tracer_provider: Mutex::new(tracer_provider),
            meter_provider: Mutex::new(meter_provider.map(Arc::new)),
            shut_down: AtomicBool::new(false),
        }
    }

    fn meter(&self, name: &'static str) -> Option<Meter> {
        lock(&self.meter_provider).as_ref().map(|p| p.meter(name))
    }

    fn meter_provider(&self) -> Option<Arc<SdkMeterProvider>> {
        lock(&self.meter_provider).clone()
    }

    fn has_metrics(&self) -> bool {
        lock(&self.meter_provider).is_some()
    }
}

impl ShutdownTarget for SdkPipelines {
    fn shutdown(&self) -> Result<(), ShutdownError> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("telemetry already shut down");
            return Ok(());
        }

        // Our handle must be gone before the global provider is dropped, or
        // the batch processor is never shut down.
        let flush_error = lock(&self.tracer_provider).take().and_then(|provider| {
            provider
                .force_flush()
                .into_iter()
                .find_map(Result::err)
        });
        opentelemetry::global::shutdown_tracer_provider();

        let metrics_error = lock(&self.meter_provider)
            .take()
            .and_then(|provider| provider.shutdown().err());

        match (flush_error, metrics_error) {
            (Some(e), _) => Err(ShutdownError::Flush(e)),
            (None, Some(e)) => Err(ShutdownError::Metrics(e)),
            (None, None) => Ok(()),
        }
    }
}

impl Drop for SdkPipelines {
    fn drop(&mut self) {
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        // Dropping the last handle to a live meter provider shuts it down
        // synchronously.
        let Some(provider) = lock(&self.meter_provider).take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || drop(provider));
            }
            Err(_) => drop(provider),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

/// Handle returned by [`register`](crate::register()).
///
/// Owns the pipelines' lifecycle. Call [`TelemetryGuard::shutdown`] to flush
/// and stop export; with signal handling enabled the signal task can do the
/// same, and only the first shutdown takes effect.
pub struct TelemetryGuard {
    pipelines: Arc<SdkPipelines>,
    instrumentations: InstrumentationSet,
}

impl TelemetryGuard {
    pub(crate) fn new(pipelines: Arc<SdkPipelines>, instrumentations: InstrumentationSet) -> Self {
        Self {
            pipelines,
            instrumentations,
        }
    }

    /// The instrumentations enabled for this registration.
    pub fn instrumentations(&self) -> &InstrumentationSet {
        &self.instrumentations
    }

    /// Whether a metrics pipeline is running.
    pub fn has_metrics(&self) -> bool {
        self.pipelines.has_metrics()
    }

    /// This registration's meter provider, or `None` when metrics are disabled
    /// or already shut down.
    ///
    /// Shared, not cloned: dropping the returned handle leaves the pipeline
    /// running.
    pub fn meter_provider(&self) -> Option<Arc<SdkMeterProvider>> {
        self.pipelines.meter_provider()
    }

    /// A meter from this registration's provider, or `None` when metrics are
    /// disabled or already shut down.
    pub fn meter(&self, name: &'static str) -> Option<Meter> {
        self.pipelines.meter(name)
    }

    pub(crate) fn shutdown_target(&self) -> Arc<dyn ShutdownTarget> {
        self.pipelines.clone()
    }

    /// Flush and shut down traces, then metrics.
    ///
    /// # Errors
    ///
    /// Returns the first flush or shutdown failure.
    pub async fn shutdown(self) -> Result<(), ShutdownError> {
        run_shutdown(self.shutdown_target()).await
    }
}

impl std::fmt::Debug for TelemetryGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryGuard")
            .field("instrumentations", &self.instrumentations.names())
            .field("metrics", &self.has_metrics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::metrics::MetricsError;

    #[tokio::test]
    async fn run_shutdown_passes_through_success() {
        let mut mock = MockShutdownTarget::new();
        mock.expect_shutdown().times(1).returning(|| Ok(()));
        assert!(run_shutdown(Arc::new(mock)).await.is_ok());
    }

    #[tokio::test]
    async fn run_shutdown_passes_through_failure() {
        let mut mock = MockShutdownTarget::new();
        mock.expect_shutdown()
            .times(1)
            .returning(|| Err(ShutdownError::Metrics(MetricsError::Other("boom".into()))));
        let err = run_shutdown(Arc::new(mock)).await.unwrap_err();
        assert!(matches!(err, ShutdownError::Metrics(_)));
    }

    #[tokio::test]
    async fn empty_pipelines_shut_down_once() {
        let pipelines = Arc::new(SdkPipelines::new(None, None));
        assert!(run_shutdown(pipelines.clone()).await.is_ok());
        assert!(pipelines.shut_down.load(Ordering::SeqCst));
        assert!(run_shutdown(pipelines).await.is_ok());
    }

    #[tokio::test]
    async fn guard_without_metrics_has_no_meter() {
        let guard = TelemetryGuard::new(
            Arc::new(SdkPipelines::new(None, None)),
            InstrumentationSet::default(),
        );
        assert!(!guard.has_metrics());
        assert!(guard.meter("test").is_none());
        assert!(guard.meter_provider().is_none());
        assert!(guard.shutdown().await.is_ok());
    }

    #[tokio::test]
    async fn meter_provider_is_released_by_shutdown() {
        let provider = SdkMeterProvider::builder().build();
        let guard = TelemetryGuard::new(
            Arc::new(SdkPipelines::new(None, Some(provider))),
            InstrumentationSet::default(),
        );
        assert!(guard.has_metrics());
        let shared = guard.meter_provider().expect("metrics enabled");
        drop(shared);
        assert!(guard.meter("test").is_some());

        let target = guard.shutdown_target();
        assert!(run_shutdown(target).await.is_ok());
        assert!(guard.meter_provider().is_none());
        assert!(!guard.has_metrics());
    }

    #[test]
    fn debug_lists_instrumentations() {
        let (set, _) = InstrumentationSet::select(&["express", "http"]);
        let guard = TelemetryGuard::new(Arc::new(SdkPipelines::new(None, None)), set);
        let dbg = format!("{guard:?}");
        assert!(dbg.contains("http,express"));
    }
}
