use gateway::{
    config::get_configuration, logging::setup_logging, pipeline::Pipeline, routes, state::AppState,
    storage,
};
use inference::{Detector, OrtBackend, YoloDetector};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = get_configuration()?;
    let _telemetry = setup_logging(&settings);

    tracing::info!(
        environment = settings.environment.as_str(),
        addr = %settings.server.addr,
        "Starting pothole gateway"
    );

    let detector: Arc<dyn Detector> =
        Arc::new(YoloDetector::<OrtBackend>::load(settings.model.clone())?);
    let store = storage::from_settings(&settings.storage)?;

    let pipeline = Pipeline::new(detector, store, settings.detection.default_threshold);
    let app = routes::router(AppState::new(pipeline), settings.server.body_limit_bytes);

    routes::run_server(&settings.server.addr, app).await
}
