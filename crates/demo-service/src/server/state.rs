//! Shared application state injected into every Axum handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use opentelemetry::metrics::{Counter, Meter};
use otel_register::TelemetryGuard;

/// Application state shared across all request handlers.
///
/// Cheap to clone: everything is `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    /// Instrumentation names reported by `/health`.
    pub instrumentations: Arc<Vec<String>>,
    /// `demo.requests` counter; `None` when metrics are off.
    pub requests: Option<Counter<u64>>,
    served: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(instrumentations: Vec<String>, meter: Option<Meter>) -> Self {
        let requests = meter.map(|m| {
            m.u64_counter("demo.requests")
                .with_description("Requests served by the demo service")
                .init()
        });
        Self {
            instrumentations: Arc::new(instrumentations),
            requests,
            served: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Build state from a live registration.
    pub fn from_guard(guard: &TelemetryGuard) -> Self {
        let names = guard
            .instrumentations()
            .iter()
            .map(|i| i.name().to_owned())
            .collect();
        Self::new(names, guard.meter(env!("CARGO_PKG_NAME")))
    }

    /// Count one served request and return the running total.
    pub fn record_request(&self, route: &'static str) -> u64 {
        if let Some(counter) = &self.requests {
            counter.add(1, &[opentelemetry::KeyValue::new("http.route", route)]);
        }
        self.served.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for AppState {
    /// State with no instrumentations and no metrics, suitable for tests.
    fn default() -> Self {
        Self::new(Vec::new(), None)
    }
}
