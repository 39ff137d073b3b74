use crate::errors::PipelineError;
use crate::storage::{ArtifactStore, StoredArtifact};
use crate::upload::{self, UploadedImage, ValidatedUpload};
use image::{ImageFormat, RgbImage};
use inference::{Detection, Detections, Detector};
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tracing::field;

/// Key prefixes the pipeline writes to. Nothing else in the store is served.
const ARTIFACT_PREFIXES: [&str; 3] = ["uploads", "results", "processed"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Predict,
    PredictJson,
    Detect,
    Artifacts,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Predict => "predict",
            Route::PredictJson => "predict_json",
            Route::Detect => "detect",
            Route::Artifacts => "artifacts",
        }
    }
}

/// Annotated image ready to be sent back as-is.
pub struct AnnotatedImage {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Debug)]
pub struct Description {
    pub filename: String,
    /// Every box the detector produced, in emission order.
    pub detections: Vec<Detection>,
}

pub struct Decision {
    pub threshold: f32,
    pub original: StoredArtifact,
    /// Present only when at least one detection met the threshold.
    pub processed: Option<StoredArtifact>,
}

struct PipelineMetrics {
    requests: Counter<u64>,
    inference_duration: Histogram<f64>,
    detections: Counter<u64>,
}

fn init_metrics(meter_name: &'static str) -> PipelineMetrics {
    let meter = global::meter(meter_name);
    let latency_buckets = [
        0.01, 0.025, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 0.75, 1.0, 2.0, 5.0,
    ];

    PipelineMetrics {
        requests: meter
            .u64_counter("pipeline_requests_total")
            .with_description("Pipeline invocations by route and outcome")
            .build(),
        inference_duration: meter
            .f64_histogram("pipeline_inference_duration_seconds")
            .with_description("Time to decode an upload and run the detector on it")
            .with_unit("s")
            .with_boundaries(latency_buckets.to_vec())
            .build(),
        detections: meter
            .u64_counter("pipeline_detections_total")
            .with_description("Total detections produced before threshold filtering")
            .build(),
    }
}

/// Upload, validate, infer, respond. One instance serves every request.
pub struct Pipeline {
    detector: Arc<dyn Detector>,
    store: Arc<dyn ArtifactStore>,
    default_threshold: f32,
    metrics: PipelineMetrics,
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn Detector>,
        store: Arc<dyn ArtifactStore>,
        default_threshold: f32,
    ) -> Self {
        Self {
            detector,
            store,
            default_threshold,
            metrics: init_metrics("gateway"),
        }
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    /// Form value for the threshold. Missing or unparseable input falls back
    /// to the configured default; the range is not checked.
    pub fn resolve_threshold(&self, raw: Option<&str>) -> f32 {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => self.default_threshold,
            Some(value) => value.parse::<f32>().unwrap_or_else(|_| {
                tracing::warn!(value, "Unparseable threshold, using default");
                self.default_threshold
            }),
        }
    }

    /// Image route: every detection drawn, nothing filtered.
    #[tracing::instrument(name = "pipeline", skip_all, fields(route = "predict", filename = field::Empty))]
    pub async fn annotate(
        &self,
        upload: Option<UploadedImage>,
    ) -> Result<AnnotatedImage, PipelineError> {
        let result: Result<AnnotatedImage, PipelineError> = async {
            let (validated, _original) = self.ingest(upload).await?;
            let ValidatedUpload { image, name } = validated;
            let (format, content_type) = upload::output_format(&name);

            let detections = self.run_detector(image.bytes).await?;
            let bytes = encode(detections.annotated, format).await?;
            self.store
                .put(&format!("results/result_{}", name), bytes.clone(), content_type)
                .await?;

            Ok(AnnotatedImage {
                bytes,
                content_type,
            })
        }
        .await;

        self.finish(Route::Predict, result)
    }

    /// JSON route: every detection listed, nothing filtered.
    #[tracing::instrument(name = "pipeline", skip_all, fields(route = "predict_json", filename = field::Empty))]
    pub async fn describe(
        &self,
        upload: Option<UploadedImage>,
    ) -> Result<Description, PipelineError> {
        let result: Result<Description, PipelineError> = async {
            let (validated, _original) = self.ingest(upload).await?;
            let ValidatedUpload { image, name } = validated;
            let (format, content_type) = upload::output_format(&name);

            let Detections { items, annotated } = self.run_detector(image.bytes).await?;
            let bytes = encode(annotated, format).await?;
            self.store
                .put(&format!("results/result_{}", name), bytes, content_type)
                .await?;

            Ok(Description {
                filename: name,
                detections: items,
            })
        }
        .await;

        self.finish(Route::PredictJson, result)
    }

    /// Decision route: yes/no against `threshold`, with the annotated copy
    /// stored only on a yes.
    #[tracing::instrument(name = "pipeline", skip_all, fields(route = "detect", filename = field::Empty, threshold = threshold))]
    pub async fn detect(
        &self,
        upload: Option<UploadedImage>,
        threshold: f32,
    ) -> Result<Decision, PipelineError> {
        let result: Result<Decision, PipelineError> = async {
            let (validated, original) = self.ingest(upload).await?;
            let ValidatedUpload { image, name } = validated;

            let detections = self.run_detector(image.bytes).await?;
            let kept = filter_by_threshold(&detections.items, threshold);

            if kept.is_empty() {
                tracing::info!(
                    total = detections.items.len(),
                    "No detection at or above threshold"
                );
                return Ok(Decision {
                    threshold,
                    original,
                    processed: None,
                });
            }

            tracing::info!(kept = kept.len(), "Pothole detected");

            // The stored overlay shows every box the detector drew
            let (format, content_type) = upload::output_format(&name);
            let bytes = encode(detections.annotated, format).await?;
            let processed = self
                .store
                .put(&format!("processed/processed_{}", name), bytes, content_type)
                .await?;

            Ok(Decision {
                threshold,
                original,
                processed: Some(processed),
            })
        }
        .await;

        self.finish(Route::Detect, result)
    }

    #[tracing::instrument(name = "artifact", skip(self))]
    pub async fn fetch_artifact(&self, key: &str) -> Result<(Vec<u8>, String), PipelineError> {
        let result: Result<(Vec<u8>, String), PipelineError> = async {
            if !is_artifact_key(key) {
                return Err(PipelineError::NotFound(key.to_string()));
            }
            let bytes = self.store.get(key).await?;
            let content_type = mime_guess::from_path(key)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
            Ok((bytes, content_type))
        }
        .await;

        self.finish(Route::Artifacts, result)
    }

    /// Presence and extension checks, sanitization, then the input is
    /// persisted before any inference runs.
    async fn ingest(
        &self,
        upload: Option<UploadedImage>,
    ) -> Result<(ValidatedUpload, StoredArtifact), PipelineError> {
        if let Some(claimed) = &upload {
            tracing::Span::current().record("filename", field::debug(&claimed.filename));
        }

        let validated = upload::validate(upload)?;
        tracing::Span::current().record("filename", validated.name.as_str());

        let (_, content_type) = validated.output_format();
        let original = self
            .store
            .put(
                &format!("uploads/{}", validated.name),
                validated.image.bytes.clone(),
                content_type,
            )
            .await?;

        Ok((validated, original))
    }

    async fn run_detector(&self, bytes: Vec<u8>) -> Result<Detections, PipelineError> {
        let detector = Arc::clone(&self.detector);
        let started = Instant::now();

        let detections = tokio::task::spawn_blocking(move || -> anyhow::Result<Detections> {
            let image = image::load_from_memory(&bytes)?;
            detector.detect(&image)
        })
        .await
        .map_err(|e| PipelineError::Dependency(e.into()))?
        .map_err(PipelineError::Dependency)?;

        let elapsed = started.elapsed().as_secs_f64();
        self.metrics.inference_duration.record(elapsed, &[]);
        self.metrics
            .detections
            .add(detections.items.len() as u64, &[]);

        tracing::info!(
            detections = detections.items.len(),
            elapsed_ms = elapsed * 1000.0,
            "Inference complete"
        );

        Ok(detections)
    }

    fn finish<T>(
        &self,
        route: Route,
        result: Result<T, PipelineError>,
    ) -> Result<T, PipelineError> {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err @ PipelineError::Dependency(_)) => {
                tracing::error!(route = route.as_str(), error = %err, "Request failed");
                err.outcome()
            }
            Err(err) => {
                tracing::warn!(route = route.as_str(), error = %err, "Request rejected");
                err.outcome()
            }
        };

        self.metrics.requests.add(
            1,
            &[
                KeyValue::new("route", route.as_str()),
                KeyValue::new("outcome", outcome),
            ],
        );

        result
    }
}

/// `<prefix>/<name>` with a known prefix and a single, non-hidden file name.
pub fn is_artifact_key(key: &str) -> bool {
    match key.split_once('/') {
        Some((prefix, name)) => {
            ARTIFACT_PREFIXES.contains(&prefix)
                && !name.is_empty()
                && !name.starts_with('.')
                && !name.contains(['/', '\\', '\0'])
        }
        None => false,
    }
}

pub fn filter_by_threshold(detections: &[Detection], threshold: f32) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.confidence >= threshold)
        .cloned()
        .collect()
}

async fn encode(image: RgbImage, format: ImageFormat) -> Result<Vec<u8>, PipelineError> {
    tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<u8>> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format)?;
        Ok(buffer.into_inner())
    })
    .await
    .map_err(|e| PipelineError::Dependency(e.into()))?
    .map_err(PipelineError::Dependency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;

    struct NoDetections;

    impl Detector for NoDetections {
        fn detect(&self, image: &image::DynamicImage) -> anyhow::Result<Detections> {
            Ok(Detections {
                items: Vec::new(),
                annotated: image.to_rgb8(),
            })
        }
    }

    fn detection(confidence: f32) -> Detection {
        Detection {
            class_id: 0,
            label: "pothole".into(),
            confidence,
            bbox: [0.0, 0.0, 10.0, 10.0],
        }
    }

    fn pipeline(default_threshold: f32) -> Pipeline {
        Pipeline::new(
            Arc::new(NoDetections),
            Arc::new(LocalStore::new(std::env::temp_dir())),
            default_threshold,
        )
    }

    #[test]
    fn test_filter_keeps_scores_at_or_above_threshold() {
        let items = vec![detection(0.3), detection(0.5), detection(0.9)];

        let kept = filter_by_threshold(&items, 0.5);

        assert_eq!(kept, vec![detection(0.5), detection(0.9)]);
        assert!(filter_by_threshold(&items, 0.95).is_empty());
        assert_eq!(filter_by_threshold(&items, 0.0).len(), 3);
    }

    #[test]
    fn test_only_pipeline_outputs_are_artifact_keys() {
        assert!(is_artifact_key("uploads/road.png"));
        assert!(is_artifact_key("results/result_road.png"));
        assert!(is_artifact_key("processed/processed_road.jpg"));

        for key in [
            ".env",
            "gateway.toml",
            "models/pothole.onnx",
            "uploads/",
            "uploads/.hidden.png",
            "uploads/nested/road.png",
            "uploads/../.env",
            "results",
        ] {
            assert!(!is_artifact_key(key), "{key} must not be served");
        }
    }

    #[test]
    fn test_resolve_threshold_falls_back_to_default() {
        let pipeline = pipeline(0.5);

        assert_eq!(pipeline.resolve_threshold(None), 0.5);
        assert_eq!(pipeline.resolve_threshold(Some("")), 0.5);
        assert_eq!(pipeline.resolve_threshold(Some("high")), 0.5);
        assert_eq!(pipeline.resolve_threshold(Some(" 0.8 ")), 0.8);
        // Out-of-range values pass through unchecked
        assert_eq!(pipeline.resolve_threshold(Some("1.5")), 1.5);
    }

    #[tokio::test]
    async fn test_undecodable_upload_is_a_dependency_error() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(
            Arc::new(NoDetections),
            Arc::new(LocalStore::new(dir.path())),
            0.5,
        );

        let err = pipeline
            .describe(Some(UploadedImage::new("road.png", b"not an image".to_vec())))
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Dependency(_)));
        // The input was persisted before inference was attempted
        assert!(dir.path().join("uploads/road.png").is_file());
    }
}
