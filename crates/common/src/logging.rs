use crate::config::Environment;
use tracing_subscriber::{Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing subscriber with pretty formatting for development
/// and JSON formatting for production.
///
/// Uses RUST_LOG environment variable for filtering (defaults to "info" if not set).
///
/// The OpenTelemetry layer is a no-op unless a tracer is installed; use
/// `TelemetryGuard::init` instead of this function when exporting.
pub fn setup_logging(environment: Environment) {
    install_subscriber(&environment, tracing_opentelemetry::layer());
}

pub(crate) fn install_subscriber<L>(environment: &Environment, otel_layer: L)
where
    L: Layer<Registry> + Send + Sync + 'static,
{
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let fmt_layer = match environment {
        Environment::Production => tracing_subscriber::fmt::layer()
            .json()
            .with_level(true)
            .boxed(),
        Environment::Development => tracing_subscriber::fmt::layer()
            .pretty()
            .with_ansi(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
