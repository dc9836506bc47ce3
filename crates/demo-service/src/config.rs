//! Configuration loading and validation for the demo service.
//!
//! Service settings come from unprefixed environment variables. The
//! `OTEL_*` variables are left to `otel-register`, which applies them wherever
//! this config leaves a field unset.

use anyhow::{Context, Result};
use otel_register::{LogLevel, RegisterConfig};
use serde::Deserialize;

/// Validated demo service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Port the HTTP server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Comma-separated instrumentation names.
    #[serde(default = "default_instruments")]
    pub instruments: String,

    /// Diagnostic log level (e.g. `"info"`, `"debug"`). Unset defers to
    /// `OTEL_LOG_LEVEL`.
    #[serde(default)]
    pub log_level: Option<String>,

    /// Export metrics alongside traces.
    #[serde(default = "default_enable_metrics")]
    pub enable_metrics: bool,

    /// Deployment environment recorded as a resource attribute.
    #[serde(default)]
    pub deployment_environment: Option<String>,
}

fn default_listen_port() -> u16 {
    8080
}
fn default_instruments() -> String {
    "http,express".into()
}
fn default_enable_metrics() -> bool {
    true
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            anyhow::bail!("LISTEN_PORT must be > 0");
        }
        if self.instrument_names().is_empty() {
            anyhow::bail!("INSTRUMENTS must name at least one instrumentation");
        }
        self.parsed_log_level()?;
        Ok(())
    }

    /// Instrumentation names with blanks removed.
    pub fn instrument_names(&self) -> Vec<String> {
        self.instruments
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect()
    }

    fn parsed_log_level(&self) -> Result<Option<LogLevel>> {
        self.log_level
            .as_deref()
            .map(|raw| {
                raw.parse()
                    .with_context(|| format!("LOG_LEVEL {raw:?} is not a log level"))
            })
            .transpose()
    }

    /// Registration settings derived from this config.
    pub fn register_config(&self) -> Result<RegisterConfig> {
        let mut rc = RegisterConfig::new(self.instrument_names())
            .with_service_name(env!("CARGO_PKG_NAME"))
            .with_metrics(self.enable_metrics)
            .with_attribute("service.version", env!("CARGO_PKG_VERSION"));
        if let Some(level) = self.parsed_log_level()? {
            rc = rc.with_log_level(level);
        }
        if let Some(env) = &self.deployment_environment {
            rc = rc.with_attribute("deployment.environment", env.clone());
        }
        Ok(rc)
    }
}
