//! Metrics enabled without the global opt-in: the guard's provider is live,
//! the process-wide provider stays the no-op default.
//!
//! The SDK reports an invalid instrument name through the global error
//! handler; the no-op provider never validates. That difference tells the
//! two apart.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::MeterProvider as _;
use otel_register::{register_with_env, EnvSettings, LogOutput, RegisterConfig};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn metrics_stay_local_without_opt_in() {
    let env = EnvSettings::from_vars([("OTEL_EXPORTER_OTLP_ENDPOINT", "http://127.0.0.1:1")])
        .unwrap();
    let cfg = RegisterConfig::new(["http"])
        .with_service_name("meter-provider-test")
        .with_log_output(LogOutput::None)
        .with_metrics(true)
        .with_signal_handling(false)
        .with_export_timeout(Duration::from_millis(500));

    let guard = register_with_env(cfg, env).expect("registration succeeds");

    let validated = Arc::new(AtomicBool::new(false));
    let seen = validated.clone();
    global::set_error_handler(move |_| seen.store(true, Ordering::SeqCst)).unwrap();

    let _ = global::meter_provider()
        .meter("meter-provider-test")
        .u64_counter("")
        .init();
    assert!(
        !validated.load(Ordering::SeqCst),
        "global meter provider was installed without opt-in"
    );

    let provider = guard.meter_provider().expect("metrics enabled");
    let _ = provider.meter("meter-provider-test").u64_counter("").init();
    assert!(validated.load(Ordering::SeqCst), "guard provider is not SDK-backed");

    let outcome = tokio::time::timeout(Duration::from_secs(30), guard.shutdown()).await;
    assert!(outcome.is_ok(), "shutdown did not settle");
}
