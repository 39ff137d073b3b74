use crate::config::Settings;
use common::{TelemetryConfig, TelemetryGuard};

const SERVICE_NAME: &str = "pothole-gateway";

/// Install the global subscriber. With an OTLP endpoint configured (or
/// `OTEL_EXPORTER_OTLP_ENDPOINT` set) traces and metrics are exported too and
/// the returned guard flushes them on drop.
pub fn setup_logging(settings: &Settings) -> Option<TelemetryGuard> {
    let endpoint = settings
        .otel_endpoint
        .clone()
        .or_else(|| std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok());

    if let Some(endpoint) = endpoint {
        let config = TelemetryConfig::new(SERVICE_NAME, &endpoint, settings.environment.clone());
        match TelemetryGuard::init(config) {
            Ok(guard) => return Some(guard),
            Err(e) => eprintln!("Telemetry export disabled, falling back to local logs: {e:#}"),
        }
    }

    common::setup_logging(settings.environment.clone());
    None
}
