use crate::processing::pre::Letterbox;
use std::cmp::Ordering;

pub struct TransformParams {
    pub orig_width: u32,
    pub orig_height: u32,
    pub letterbox: Letterbox,
}

/// A decoded box in original image pixels, before class names are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: usize,
}

pub struct PostProcessor {
    pub min_confidence: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
    /// Classes the model was trained on; fixes the attribute axis length.
    pub num_classes: usize,
}

impl PostProcessor {
    pub fn new(
        min_confidence: f32,
        iou_threshold: f32,
        max_detections: usize,
        num_classes: usize,
    ) -> Self {
        Self {
            min_confidence,
            iou_threshold,
            max_detections,
            num_classes,
        }
    }

    /// Whether the anchors run along axis 1 (`[1, N, 4 + C]`). The axis of
    /// length `4 + num_classes` holds the attributes; when neither axis
    /// matches, the shorter one is assumed.
    fn is_transposed(&self, shape: &[usize]) -> bool {
        let attrs = 4 + self.num_classes;
        if shape[1] == attrs {
            false
        } else if shape[2] == attrs {
            true
        } else {
            tracing::warn!(
                ?shape,
                expected_attrs = attrs,
                "Prediction shape does not match the configured class count"
            );
            shape[2] < shape[1] && shape[2] >= 5
        }
    }

    /// Decode a YOLO head output and apply class-aware non-max suppression.
    ///
    /// Accepts `[1, 4 + C, N]` (the usual export) as well as the transposed
    /// `[1, N, 4 + C]`.
    /// Boxes come out sorted by descending confidence.
    #[tracing::instrument(skip(self, predictions, transform))]
    pub fn parse_detections(
        &self,
        predictions: &ndarray::ArrayViewD<f32>,
        transform: &TransformParams,
    ) -> anyhow::Result<Vec<RawDetection>> {
        let shape = predictions.shape();
        if shape.len() != 3 || shape[0] != 1 {
            anyhow::bail!("Unexpected prediction shape {:?}, expected [1, A, N]", shape);
        }

        let transposed = self.is_transposed(shape);
        let (num_attrs, num_anchors) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };

        if num_attrs < 5 {
            anyhow::bail!(
                "Prediction tensor has {} attributes per anchor, need at least 5",
                num_attrs
            );
        }

        let at = |attr: usize, anchor: usize| -> f32 {
            if transposed {
                predictions[[0, anchor, attr]]
            } else {
                predictions[[0, attr, anchor]]
            }
        };

        let mut candidates = Vec::new();

        for i in 0..num_anchors {
            // Argmax over class scores
            let mut confidence = f32::NEG_INFINITY;
            let mut class_id = 0usize;
            for c in 4..num_attrs {
                let score = at(c, i);
                if score > confidence {
                    confidence = score;
                    class_id = c - 4;
                }
            }

            if confidence < self.min_confidence {
                continue;
            }

            let (x1_input, y1_input, x2_input, y2_input) =
                cxcywh_to_xyxy(at(0, i), at(1, i), at(2, i), at(3, i));

            candidates.push(RawDetection {
                x1: unletterbox(x1_input, transform.letterbox.offset_x, transform, true),
                y1: unletterbox(y1_input, transform.letterbox.offset_y, transform, false),
                x2: unletterbox(x2_input, transform.letterbox.offset_x, transform, true),
                y2: unletterbox(y2_input, transform.letterbox.offset_y, transform, false),
                confidence,
                class_id,
            });
        }

        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        tracing::trace!(kept = kept.len(), anchors = num_anchors, "Decoded detections");

        Ok(kept)
    }
}

/// Apply inverse letterbox transform and clamp to original image bounds.
#[inline]
fn unletterbox(value: f32, offset: f32, transform: &TransformParams, horizontal: bool) -> f32 {
    let limit = if horizontal {
        transform.orig_width
    } else {
        transform.orig_height
    };
    ((value - offset) / transform.letterbox.scale)
        .max(0.0)
        .min(limit as f32)
}

/// Greedy NMS. Only boxes of the same class suppress each other.
pub fn non_max_suppression(
    mut candidates: Vec<RawDetection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<RawDetection> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut kept: Vec<RawDetection> = Vec::new();

    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }

        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);

        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

/// Intersection over union of two corner-format boxes
pub fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Convert bounding box from center-width-height format to corner format
#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    let x1 = cx - w / 2.0;
    let y1 = cy - h / 2.0;
    let x2 = cx + w / 2.0;
    let y2 = cy + h / 2.0;
    (x1, y1, x2, y2)
}
