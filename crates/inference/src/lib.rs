pub mod annotate;
pub mod backend;
pub mod config;
pub mod detector;
pub mod processing;

pub use backend::{ExecutionProvider, InferenceBackend, InferenceOutput};
pub use config::DetectorConfig;
pub use detector::{Detection, Detections, Detector, YoloDetector};

#[cfg(feature = "ort-backend")]
pub use backend::ort::OrtBackend;
