use ndarray::{Array, IxDyn};
use serde::Deserialize;

#[cfg(feature = "ort-backend")]
pub mod ort;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionProvider {
    #[default]
    Cpu,
    Cuda,
}

pub trait InferenceBackend: Send {
    fn load_model(path: &str, provider: ExecutionProvider) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run inference on a `[1, 3, H, W]` normalized RGB tensor
    fn infer(&mut self, images: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;
}

pub struct InferenceOutput {
    pub predictions: ndarray::ArrayD<f32>, // [1, 4 + num_classes, num_anchors] cxcywh in input pixels
}
