use crate::backend::ExecutionProvider;
use serde::Deserialize;

pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Detector settings, loaded once at startup by the hosting service.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    #[serde(alias = "path")]
    pub model_path: String,
    /// Square network input edge in pixels.
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_class_names")]
    pub class_names: Vec<String>,
    /// Scores below this never leave the detector.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
    #[serde(default)]
    pub execution_provider: ExecutionProvider,
    /// TrueType/OpenType font used for box labels. Labels are drawn as bare
    /// colour tabs when unset.
    #[serde(default)]
    pub font_path: Option<String>,
}

fn default_input_size() -> u32 {
    DEFAULT_INPUT_SIZE
}

fn default_class_names() -> Vec<String> {
    vec!["pothole".to_string()]
}

fn default_min_confidence() -> f32 {
    0.25
}

fn default_iou_threshold() -> f32 {
    0.7
}

fn default_max_detections() -> usize {
    300
}

impl DetectorConfig {
    pub fn label_for(&self, class_id: usize) -> String {
        self.class_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }

    /// Create default configuration for testing
    #[cfg(test)]
    pub fn test_default() -> Self {
        Self {
            model_path: "/models/yolo_pothole_model.onnx".to_string(),
            input_size: DEFAULT_INPUT_SIZE,
            class_names: default_class_names(),
            min_confidence: default_min_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            execution_provider: ExecutionProvider::Cpu,
            font_path: None,
        }
    }
}
