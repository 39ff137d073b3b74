use crate::detector::Detection;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

const PALETTE: [[u8; 3]; 10] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
];
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws boxes and labels over a copy of the source image.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font: Option<FontVec>) -> Self {
        Self { font }
    }

    pub fn from_font_file(path: &str) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow::anyhow!("{} is not a valid TrueType/OpenType font", path))?;
        Ok(Self::new(Some(font)))
    }

    pub fn render(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        // Line width scales with image size, as in common YOLO plotting
        let thickness = (((width + height) as f32 * 0.001).round() as u32).max(2);
        let label_height = (thickness * 6).max(12);

        for detection in detections {
            let color = Rgb(PALETTE[detection.class_id % PALETTE.len()]);
            let Some(rect) = to_rect(detection.bbox, width, height) else {
                continue;
            };

            for inset in 0..thickness {
                let w = rect.width().saturating_sub(2 * inset);
                let h = rect.height().saturating_sub(2 * inset);
                if w == 0 || h == 0 {
                    break;
                }
                draw_hollow_rect_mut(
                    &mut canvas,
                    Rect::at(rect.left() + inset as i32, rect.top() + inset as i32).of_size(w, h),
                    color,
                );
            }

            let text = format!("{} {:.2}", detection.label, detection.confidence);
            let scale = PxScale::from(label_height as f32);
            let label_width = match &self.font {
                Some(font) => text_size(scale, font, &text).0 + thickness,
                None => label_height * 2,
            };

            // Above the box when there is room, otherwise inside it
            let label_top = if rect.top() >= label_height as i32 {
                rect.top() - label_height as i32
            } else {
                rect.top()
            };
            draw_filled_rect_mut(
                &mut canvas,
                Rect::at(rect.left(), label_top).of_size(label_width, label_height),
                color,
            );

            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut canvas,
                    TEXT_COLOR,
                    rect.left() + (thickness / 2) as i32,
                    label_top,
                    scale,
                    font,
                    &text,
                );
            }
        }

        canvas
    }
}

/// Clip a corner-format box to the canvas. Degenerate boxes yield `None`.
fn to_rect(bbox: [f32; 4], width: u32, height: u32) -> Option<Rect> {
    let [x1, y1, x2, y2] = bbox;
    if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
        return None;
    }

    let left = x1.min(x2).max(0.0).floor() as i64;
    let top = y1.min(y2).max(0.0).floor() as i64;
    let right = (x1.max(x2).ceil() as i64).min(width as i64 - 1);
    let bottom = (y1.max(y2).ceil() as i64).min(height as i64 - 1);

    if right <= left || bottom <= top {
        return None;
    }

    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32, (bottom - top) as u32))
}
