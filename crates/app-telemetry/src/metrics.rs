//! Prometheus helpers.
//!
//! Collector names follow `<namespace>_<subsystem>_<metric>_<unit>`. The
//! registry itself is owned by the metrics server subsystem; this module only
//! builds registries and renders them.

use prometheus::{Encoder, Registry, TextEncoder};

use crate::TelemetryError;

/// Create a registry whose collectors are all prefixed with `namespace`.
pub fn namespaced_registry(namespace: &str) -> Registry {
    if namespace.is_empty() {
        return Registry::new();
    }
    // Only fails on an invalid label map; we pass none.
    Registry::new_custom(Some(namespace.to_string()), None).unwrap_or_default()
}

/// Encode every collector of `registry` in the Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsEncode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsEncode(e.to_string()))
}
