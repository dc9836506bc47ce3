//! One-call OpenTelemetry bootstrap for Tokio services.
//!
//! [`register`] resolves settings (explicit config, then `OTEL_*` environment,
//! then defaults), selects instrumentations, starts an OTLP/gRPC trace
//! pipeline and optionally a metrics pipeline, installs the global `tracing`
//! subscriber and returns a [`TelemetryGuard`] that owns the lifecycle.
//!
//! ```no_run
//! use otel_register::{register, RegisterConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let guard = register(
//!         RegisterConfig::new(["http", "express"])
//!             .with_endpoint("http://otel-collector:4317")
//!             .with_service_name("checkout"),
//!     )?;
//!
//!     tracing::info!("serving");
//!
//!     guard.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod exporter;
pub mod guard;
pub mod init;
pub mod instrumentation;
pub mod register;
pub mod signal;

pub use config::{Compression, EnvSettings, LogLevel, LogOutput, RegisterConfig, ResolvedConfig};
pub use error::{InvalidValue, RegisterError, ShutdownError};
pub use guard::{ShutdownTarget, TelemetryGuard};
pub use instrumentation::{Instrumentation, InstrumentationSet};
pub use register::{register, register_with_env};
pub use signal::{shutdown_and_report, wait_for_termination, Termination};
