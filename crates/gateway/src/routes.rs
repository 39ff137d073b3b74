use crate::errors::{ApiError, PipelineError};
use crate::response::{DecisionResponse, DescribeResponse, HealthResponse};
use crate::state::AppState;
use crate::upload::UploadedImage;
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, Path, State,
        multipart::MultipartRejection,
    },
    http::header,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedImage>,
    threshold: Option<String>,
}

/// Pull the `file` part (and `threshold` when present) out of the body. A
/// request that is not multipart at all is treated as carrying no file, and
/// so is a `file` part without a `filename` parameter, since that is a plain
/// form value rather than an upload.
async fn read_form(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadForm, PipelineError> {
    let mut form = UploadForm::default();

    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!(reason = %rejection, "Request body is not multipart");
            return Ok(form);
        }
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        let filename = field.file_name().map(str::to_owned);
        match (name.as_deref(), filename) {
            (Some("file"), Some(filename)) if form.file.is_none() => {
                let bytes = field.bytes().await?;
                form.file = Some(UploadedImage::new(filename, bytes.to_vec()));
            }
            (Some("threshold"), _) => form.threshold = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(form)
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let form = read_form(multipart).await.map_err(ApiError::error)?;
    let annotated = state
        .pipeline
        .annotate(form.file)
        .await
        .map_err(ApiError::error)?;

    Ok(([(header::CONTENT_TYPE, annotated.content_type)], annotated.bytes).into_response())
}

async fn predict_json(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DescribeResponse>, ApiError> {
    let form = read_form(multipart).await.map_err(ApiError::error)?;
    let description = state
        .pipeline
        .describe(form.file)
        .await
        .map_err(ApiError::error)?;

    Ok(Json(description.into()))
}

async fn detect(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let form = read_form(multipart)
        .await
        .map_err(ApiError::status_message)?;
    let threshold = state.pipeline.resolve_threshold(form.threshold.as_deref());
    let decision = state
        .pipeline
        .detect(form.file, threshold)
        .await
        .map_err(ApiError::status_message)?;

    Ok(Json(decision.into()))
}

async fn artifact(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let (bytes, content_type) = state
        .pipeline
        .fetch_artifact(&key)
        .await
        .map_err(ApiError::error)?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/predict", post(predict))
        .route("/predict_json", post(predict_json))
        .route("/detect", post(detect))
        .route("/artifacts/*key", get(artifact))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(addr: &str, app: Router) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
