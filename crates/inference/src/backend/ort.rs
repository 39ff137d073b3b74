use super::{ExecutionProvider, InferenceBackend, InferenceOutput};
use anyhow::{Context, bail};
use ndarray::{Array, IxDyn};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{
        Session,
        builder::{GraphOptimizationLevel, SessionBuilder},
    },
    value::TensorRef,
};

const INTRA_THREADS: usize = 4;

/// ONNX Runtime session for a single-input, single-output YOLO graph.
pub struct OrtBackend {
    session: Session,
}

fn with_provider(
    builder: SessionBuilder,
    provider: ExecutionProvider,
) -> anyhow::Result<SessionBuilder> {
    match provider {
        ExecutionProvider::Cuda => {
            tracing::info!(device = 0, "Registering CUDA execution provider");
            let cuda = CUDAExecutionProvider::default()
                .with_device_id(0)
                .build()
                .error_on_failure();
            Ok(builder.with_execution_providers([cuda])?)
        }
        ExecutionProvider::Cpu => {
            tracing::info!("Using CPU execution provider");
            Ok(builder)
        }
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &str, provider: ExecutionProvider) -> anyhow::Result<Self> {
        let _ = ort::init().commit();

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(INTRA_THREADS)?;

        let session = with_provider(builder, provider)?
            .commit_from_file(path)
            .with_context(|| format!("failed to load detection model from {path}"))?;

        tracing::info!(path, ?provider, "Detection model loaded");
        Ok(Self { session })
    }

    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        // Input names differ between exporters, so bind positionally.
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(images.view())?])?;

        let predictions = outputs[0].try_extract_array::<f32>()?.into_owned();
        if predictions.ndim() != 3 {
            bail!("expected a rank-3 prediction tensor, got shape {:?}", predictions.shape());
        }

        Ok(InferenceOutput { predictions })
    }
}
