//! OTLP exporter and resource construction.

use opentelemetry::KeyValue;
use opentelemetry_otlp::{TonicExporterBuilder, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{SERVICE_INSTANCE_ID, SERVICE_NAME};
use uuid::Uuid;

use crate::config::ResolvedConfig;

/// `telemetry.distro.*` resource keys identifying this crate as the distro.
pub const TELEMETRY_DISTRO_NAME: &str = "telemetry.distro.name";
pub const TELEMETRY_DISTRO_VERSION: &str = "telemetry.distro.version";

/// OTLP/gRPC exporter builder bound to the resolved endpoint.
///
/// The endpoint is passed through unchanged: gRPC routes by service name, so
/// no `/v1/traces` or `/v1/metrics` path is appended. Used for both the span
/// and the metrics exporter.
pub fn tonic_exporter(cfg: &ResolvedConfig) -> TonicExporterBuilder {
    let builder = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(cfg.endpoint.clone())
        .with_timeout(cfg.export_timeout);

    match cfg.compression.to_otlp() {
        Some(compression) => builder.with_compression(compression),
        None => builder,
    }
}

/// Resource describing this process.
///
/// Starts from the SDK default resource (which already honours
/// `OTEL_RESOURCE_ATTRIBUTES`) and layers on a random `service.instance.id`,
/// the `telemetry.distro.*` pair, the caller's custom attributes and finally `service.name`, so the resolved
/// service name always wins.
pub fn service_resource(cfg: &ResolvedConfig) -> Resource {
    let mut attributes = Vec::with_capacity(cfg.custom_attributes.len() + 4);
    attributes.push(KeyValue::new(
        SERVICE_INSTANCE_ID,
        Uuid::new_v4().to_string(),
    ));
    attributes.push(KeyValue::new(TELEMETRY_DISTRO_NAME, env!("CARGO_PKG_NAME")));
    attributes.push(KeyValue::new(
        TELEMETRY_DISTRO_VERSION,
        env!("CARGO_PKG_VERSION"),
    ));
    attributes.extend(
        cfg.custom_attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
    );
    attributes.push(KeyValue::new(SERVICE_NAME, cfg.service_name.clone()));

    Resource::default().merge(&Resource::new(attributes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Compression, EnvSettings, RegisterConfig};
    use opentelemetry::{Key, Value};
    use opentelemetry_otlp::HasExportConfig;

    fn resolved(cfg: RegisterConfig) -> ResolvedConfig {
        ResolvedConfig::resolve(cfg, EnvSettings::default()).unwrap()
    }

    #[test]
    fn resource_carries_service_name() {
        let cfg = resolved(RegisterConfig::new(["http"]).with_service_name("checkout"));
        let resource = service_resource(&cfg);
        assert_eq!(
            resource.get(Key::from_static_str(SERVICE_NAME)),
            Some(Value::from("checkout"))
        );
        assert!(resource
            .get(Key::from_static_str(SERVICE_INSTANCE_ID))
            .is_some());
    }

    #[test]
    fn custom_attributes_are_attached() {
        let cfg = resolved(
            RegisterConfig::new(["http"])
                .with_service_name("checkout")
                .with_attribute("deployment.environment", "staging"),
        );
        let resource = service_resource(&cfg);
        assert_eq!(
            resource.get(Key::from_static_str("deployment.environment")),
            Some(Value::from("staging"))
        );
    }

    #[test]
    fn custom_attributes_cannot_override_service_name() {
        let cfg = resolved(
            RegisterConfig::new(["http"])
                .with_service_name("checkout")
                .with_attribute(SERVICE_NAME, "impostor"),
        );
        let resource = service_resource(&cfg);
        assert_eq!(
            resource.get(Key::from_static_str(SERVICE_NAME)),
            Some(Value::from("checkout"))
        );
    }

    #[test]
    fn instance_ids_differ_per_resource() {
        let cfg = resolved(RegisterConfig::new(["http"]).with_service_name("checkout"));
        let a = service_resource(&cfg);
        let b = service_resource(&cfg);
        assert_ne!(
            a.get(Key::from_static_str(SERVICE_INSTANCE_ID)),
            b.get(Key::from_static_str(SERVICE_INSTANCE_ID))
        );
    }

    #[test]
    fn distro_attributes_are_attached() {
        let cfg = resolved(RegisterConfig::new(["http"]).with_service_name("checkout"));
        let resource = service_resource(&cfg);
        assert_eq!(
            resource.get(Key::from_static_str(TELEMETRY_DISTRO_NAME)),
            Some(Value::from("otel-register"))
        );
        assert_eq!(
            resource.get(Key::from_static_str(TELEMETRY_DISTRO_VERSION)),
            Some(Value::from(env!("CARGO_PKG_VERSION")))
        );
    }

    #[test]
    fn exporter_uses_resolved_endpoint_and_timeout() {
        let cfg = resolved(
            RegisterConfig::new(["http"])
                .with_endpoint("http://collector:4317")
                .with_export_timeout(std::time::Duration::from_millis(750)),
        );
        let mut builder = tonic_exporter(&cfg);
        let export = builder.export_config();
        assert_eq!(export.endpoint, "http://collector:4317");
        assert_eq!(export.timeout, std::time::Duration::from_millis(750));
    }

    #[test]
    fn gzip_reaches_the_exporter_builder() {
        let gzip = resolved(RegisterConfig::new(["http"]).with_compression(Compression::Gzip));
        assert!(format!("{:?}", tonic_exporter(&gzip)).contains("Gzip"));

        let plain = resolved(RegisterConfig::new(["http"]));
        assert!(!format!("{:?}", tonic_exporter(&plain)).contains("Gzip"));
    }
}
