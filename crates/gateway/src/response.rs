use crate::pipeline::{Decision, Description};
use inference::Detection;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DetectionView {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
    pub bbox: [f32; 4],
}

impl From<&Detection> for DetectionView {
    fn from(detection: &Detection) -> Self {
        Self {
            class_name: detection.label.clone(),
            confidence: detection.confidence,
            bbox: detection.bbox,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DescribeResponse {
    pub filename: String,
    pub detections: Vec<DetectionView>,
}

impl From<Description> for DescribeResponse {
    fn from(description: Description) -> Self {
        Self {
            detections: description.detections.iter().map(DetectionView::from).collect(),
            filename: description.filename,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub status: &'static str,
    /// `"yes"` or `"no"`
    pub detection: &'static str,
    pub confidence_threshold: f32,
    pub original_image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_image_url: Option<String>,
    /// Only the negative branch explains itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

impl From<Decision> for DecisionResponse {
    fn from(decision: Decision) -> Self {
        match decision.processed {
            Some(processed) => Self {
                status: "success",
                detection: "yes",
                confidence_threshold: decision.threshold,
                original_image_url: decision.original.location,
                processed_image_url: Some(processed.location),
                message: None,
            },
            None => Self {
                status: "success",
                detection: "no",
                confidence_threshold: decision.threshold,
                original_image_url: decision.original.location,
                processed_image_url: None,
                message: Some("No pothole detected"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoredArtifact;
    use serde_json::json;

    fn artifact(key: &str) -> StoredArtifact {
        StoredArtifact {
            key: key.to_string(),
            location: format!("https://bucket.s3.us-east-1.amazonaws.com/{key}"),
        }
    }

    #[test]
    fn test_detection_view_uses_class_key() {
        let detection = Detection {
            class_id: 0,
            label: "pothole".into(),
            confidence: 0.5,
            bbox: [1.0, 2.0, 3.0, 4.0],
        };

        let value = serde_json::to_value(DetectionView::from(&detection)).unwrap();
        assert_eq!(
            value,
            json!({ "class": "pothole", "confidence": 0.5, "bbox": [1.0, 2.0, 3.0, 4.0] })
        );
    }

    #[test]
    fn test_negative_decision_omits_processed_url() {
        let response = DecisionResponse::from(Decision {
            threshold: 0.95,
            original: artifact("uploads/road.png"),
            processed: None,
        });

        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["detection"], "no");
        assert_eq!(value["message"], "No pothole detected");
        assert!((value["confidence_threshold"].as_f64().unwrap() - 0.95).abs() < 1e-6);
        assert!(value.get("processed_image_url").is_none());
    }

    #[test]
    fn test_positive_decision_carries_both_urls() {
        let response = DecisionResponse::from(Decision {
            threshold: 0.5,
            original: artifact("uploads/road.png"),
            processed: Some(artifact("processed/processed_road.png")),
        });

        let value = serde_json::to_value(response).unwrap();
        assert_eq!(value["status"], "success");
        assert_eq!(value["detection"], "yes");
        assert_eq!(
            value["processed_image_url"],
            "https://bucket.s3.us-east-1.amazonaws.com/processed/processed_road.png"
        );
        assert_ne!(value["processed_image_url"], value["original_image_url"]);
        assert!(value.get("message").is_none());
    }
}
