use crate::Environment;
use crate::logging::install_subscriber;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::{MetricExporter, SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
    propagation::TraceContextPropagator,
    trace::{Sampler, SdkTracerProvider},
};
use opentelemetry_semantic_conventions::attribute::{SERVICE_NAME, SERVICE_VERSION};
use std::time::Duration;

/// OTLP export settings for one service.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// gRPC collector endpoint, e.g. `http://localhost:4317`.
    pub endpoint: String,
    pub environment: Environment,
    pub metric_export_interval: Duration,
    /// Fraction of root traces kept. Child spans follow their parent.
    pub trace_sample_ratio: f64,
}

impl TelemetryConfig {
    pub fn new(service_name: &str, endpoint: &str, environment: Environment) -> Self {
        Self {
            service_name: service_name.to_string(),
            endpoint: endpoint.to_string(),
            environment,
            metric_export_interval: Duration::from_secs(10),
            trace_sample_ratio: 1.0,
        }
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_attributes([
                KeyValue::new(SERVICE_NAME, self.service_name.clone()),
                KeyValue::new(SERVICE_VERSION, env!("CARGO_PKG_VERSION")),
                KeyValue::new("deployment.environment", self.environment.as_str()),
            ])
            .build()
    }

    fn tracer_provider(&self, resource: Resource) -> anyhow::Result<SdkTracerProvider> {
        let exporter = SpanExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .build()?;

        Ok(SdkTracerProvider::builder()
            .with_resource(resource)
            .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                self.trace_sample_ratio,
            ))))
            .with_batch_exporter(exporter)
            .build())
    }

    fn meter_provider(&self, resource: Resource) -> anyhow::Result<SdkMeterProvider> {
        let exporter = MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&self.endpoint)
            .build()?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(self.metric_export_interval)
            .build();

        Ok(SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .build())
    }
}

/// Owns the global tracer and meter providers. Dropping it flushes and shuts
/// both down, so keep it alive for the whole process.
///
/// ```ignore
/// let config = TelemetryConfig::new("pothole-gateway", "http://localhost:4317", Environment::Production);
/// let _telemetry = TelemetryGuard::init(config)?;
/// ```
pub struct TelemetryGuard {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryGuard {
    /// Install OTLP exporters and the global tracing subscriber in one go.
    /// Must run inside a Tokio runtime. Do not combine with
    /// [`crate::setup_logging`].
    pub fn init(config: TelemetryConfig) -> anyhow::Result<Self> {
        global::set_text_map_propagator(TraceContextPropagator::new());

        let resource = config.resource();
        let tracer_provider = config.tracer_provider(resource.clone())?;
        let meter_provider = config.meter_provider(resource)?;

        global::set_tracer_provider(tracer_provider.clone());
        global::set_meter_provider(meter_provider.clone());

        let otel_layer = tracing_opentelemetry::layer()
            .with_tracer(global::tracer(config.service_name.clone()));
        install_subscriber(&config.environment, otel_layer);

        tracing::info!(
            service_name = %config.service_name,
            endpoint = %config.endpoint,
            "OpenTelemetry export enabled"
        );

        Ok(Self {
            tracer_provider,
            meter_provider,
        })
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Err(e) = self.tracer_provider.shutdown() {
            eprintln!("Tracer provider shutdown failed: {e:?}");
        }
        if let Err(e) = self.meter_provider.shutdown() {
            eprintln!("Meter provider shutdown failed: {e:?}");
        }
    }
}

/// Enter an info-level span for the rest of the scope.
#[macro_export]
macro_rules! span {
    ($name:literal) => {
        tracing::info_span!($name).entered()
    };
}

/// Enter a debug-level span for the rest of the scope.
#[macro_export]
macro_rules! span_debug {
    ($name:literal) => {
        tracing::debug_span!($name).entered()
    };
}
