//! Metrics with the global opt-in: the process-wide provider is the SDK one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use otel_register::{register_with_env, EnvSettings, LogOutput, RegisterConfig};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn opt_in_installs_global_meter_provider() {
    let env = EnvSettings::from_vars([("OTEL_EXPORTER_OTLP_ENDPOINT", "http://127.0.0.1:1")])
        .unwrap();
    let cfg = RegisterConfig::new(["http"])
        .with_service_name("global-meter-test")
        .with_log_output(LogOutput::None)
        .with_metrics(true)
        .with_global_meter_provider(true)
        .with_signal_handling(false)
        .with_export_timeout(Duration::from_millis(500));

    let guard = register_with_env(cfg, env).expect("registration succeeds");

    let validated = Arc::new(AtomicBool::new(false));
    let seen = validated.clone();
    global::set_error_handler(move |_| seen.store(true, Ordering::SeqCst)).unwrap();

    let _ = global::meter("global-meter-test").u64_counter("").init();
    assert!(validated.load(Ordering::SeqCst), "global meter provider is still the no-op one");

    let outcome = tokio::time::timeout(Duration::from_secs(30), guard.shutdown()).await;
    assert!(outcome.is_ok(), "shutdown did not settle");
}
