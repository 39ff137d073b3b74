use crate::{
    annotate::Annotator,
    backend::{InferenceBackend, InferenceOutput},
    config::DetectorConfig,
    processing::{
        post::{PostProcessor, TransformParams},
        pre::PreProcessor,
    },
};
use image::{DynamicImage, RgbImage};
use std::sync::Mutex;

/// One predicted object in original image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class_id: usize,
    pub label: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f32; 4],
}

/// Detector output: boxes in emission order plus the rendered overlay.
pub struct Detections {
    pub items: Vec<Detection>,
    /// Same dimensions as the input image.
    pub annotated: RgbImage,
}

/// The detection capability consumed by request handlers.
///
/// Implementations are shared across concurrent requests and must be
/// reentrant or serialize internally.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Detections>;
}

struct Session<B> {
    backend: B,
    preprocessor: PreProcessor,
}

/// YOLO-family detector over any [`InferenceBackend`]. Backends need `&mut`
/// access, so calls are serialized on an internal mutex.
pub struct YoloDetector<B: InferenceBackend> {
    session: Mutex<Session<B>>,
    postprocessor: PostProcessor,
    annotator: Annotator,
    config: DetectorConfig,
}

impl<B: InferenceBackend> YoloDetector<B> {
    pub fn new(backend: B, config: DetectorConfig, annotator: Annotator) -> Self {
        let postprocessor = PostProcessor::new(
            config.min_confidence,
            config.iou_threshold,
            config.max_detections,
            config.class_names.len(),
        );
        let preprocessor = PreProcessor::new(config.input_size);
        Self {
            session: Mutex::new(Session {
                backend,
                preprocessor,
            }),
            postprocessor,
            annotator,
            config,
        }
    }

    /// Load the model and label font described by `config`.
    pub fn load(config: DetectorConfig) -> anyhow::Result<Self> {
        tracing::info!(
            model_path = %config.model_path,
            provider = ?config.execution_provider,
            "Loading detection model"
        );
        let backend = B::load_model(&config.model_path, config.execution_provider)?;

        let annotator = match config.font_path.as_deref() {
            Some(path) => Annotator::from_font_file(path)?,
            None => {
                tracing::warn!("No label font configured, boxes are drawn without text");
                Annotator::new(None)
            }
        };

        Ok(Self::new(backend, config, annotator))
    }
}

impl<B: InferenceBackend> Detector for YoloDetector<B> {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Detections> {
        let rgb = image.to_rgb8();
        let (orig_width, orig_height) = rgb.dimensions();

        let (predictions, letterbox) = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| anyhow::anyhow!("Detector session poisoned by an earlier panic"))?;
            let session = &mut *session;

            let (input, letterbox) = session.preprocessor.preprocess_image(&rgb)?;

            let InferenceOutput { predictions } = {
                let _infer_span = tracing::info_span!("model_inference").entered();
                session.backend.infer(&input)?
            };

            (predictions, letterbox)
        };

        let transform = TransformParams {
            orig_width,
            orig_height,
            letterbox,
        };

        let items: Vec<Detection> = self
            .postprocessor
            .parse_detections(&predictions.view(), &transform)?
            .into_iter()
            .map(|raw| Detection {
                class_id: raw.class_id,
                label: self.config.label_for(raw.class_id),
                confidence: raw.confidence,
                bbox: [raw.x1, raw.y1, raw.x2, raw.y2],
            })
            .collect();

        let annotated = {
            let _s = common::span_debug!("annotate");
            self.annotator.render(&rgb, &items)
        };

        tracing::debug!(
            width = orig_width,
            height = orig_height,
            detections = items.len(),
            "Image processed"
        );

        Ok(Detections { items, annotated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExecutionProvider;
    use image::Rgb;
    use ndarray::{Array, IxDyn};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend that emits one fixed anchor per call: a 64x64 box centred in
    /// the network input with the given score.
    struct FixedBackend {
        score: f32,
        calls: Arc<AtomicUsize>,
    }

    impl InferenceBackend for FixedBackend {
        fn load_model(_path: &str, _provider: ExecutionProvider) -> anyhow::Result<Self> {
            anyhow::bail!("FixedBackend is constructed directly")
        }

        fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let side = images.shape()[3] as f32;
            let predictions = Array::from_shape_vec(
                IxDyn(&[1, 5, 1]),
                vec![side / 2.0, side / 2.0, 64.0, 64.0, self.score],
            )?;
            Ok(InferenceOutput { predictions })
        }
    }

    fn detector(score: f32) -> (YoloDetector<FixedBackend>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = FixedBackend {
            score,
            calls: Arc::clone(&calls),
        };
        (
            YoloDetector::new(backend, DetectorConfig::test_default(), Annotator::new(None)),
            calls,
        )
    }

    #[test]
    fn test_detect_maps_boxes_to_labels_in_original_pixels() {
        let (detector, calls) = detector(0.9);
        // 1280x1280 -> scale 0.5, so the 64px box becomes 128px
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1280, 1280, Rgb([10, 10, 10])));

        let result = detector.detect(&image).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.items.len(), 1);
        let det = &result.items[0];
        assert_eq!(det.label, "pothole");
        assert_eq!(det.confidence, 0.9);
        assert_eq!(det.bbox, [576.0, 576.0, 704.0, 704.0]);
        assert_eq!(result.annotated.dimensions(), (1280, 1280));
    }

    #[test]
    fn test_low_scores_yield_no_detections_and_plain_image() {
        let (detector, _) = detector(0.1);
        let source = RgbImage::from_pixel(64, 48, Rgb([1, 2, 3]));

        let result = detector
            .detect(&DynamicImage::ImageRgb8(source.clone()))
            .unwrap();

        assert!(result.items.is_empty());
        assert_eq!(result.annotated, source);
    }

    #[test]
    fn test_detector_is_shareable_across_threads() {
        let (detector, calls) = detector(0.9);
        let detector: Arc<dyn Detector> = Arc::new(detector);
        let image = Arc::new(DynamicImage::ImageRgb8(RgbImage::new(32, 32)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let detector = Arc::clone(&detector);
                let image = Arc::clone(&image);
                std::thread::spawn(move || detector.detect(&image).map(|d| d.items.len()))
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 1);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
