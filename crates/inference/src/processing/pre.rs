use crate::config::DEFAULT_INPUT_SIZE;
use common::span;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use image::RgbImage;
use ndarray::{Array, IxDyn};

const LETTERBOX_COLOR: u8 = 114;

/// Maps network-input coordinates back onto the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

pub struct PreProcessor {
    pub input_size: u32,
    rgb_buffer: Vec<u8>,
    letterboxed_buffer: Vec<u8>,
}

impl PreProcessor {
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            rgb_buffer: Vec::with_capacity(1920 * 1080 * 3),
            letterboxed_buffer: vec![LETTERBOX_COLOR; (input_size * input_size * 3) as usize],
        }
    }

    pub fn preprocess_image(
        &mut self,
        image: &RgbImage,
    ) -> anyhow::Result<(Array<f32, IxDyn>, Letterbox)> {
        let _s = span!("preprocess_image");

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot preprocess an empty {}x{} image", width, height);
        }

        tracing::trace!(width, height, "Preprocessing image dimensions");

        self.rgb_buffer.clear();
        self.rgb_buffer.extend_from_slice(image.as_raw());

        let letterbox = self.resize_and_letterbox(width, height)?;
        let input = self.normalize()?;

        Ok((input, letterbox))
    }

    fn resize_and_letterbox(&mut self, width: u32, height: u32) -> anyhow::Result<Letterbox> {
        let _s = span!("resize_and_letterbox");

        let size = self.input_size;
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, size);
        let new_height = ((height as f32 * scale) as u32).clamp(1, size);

        let offset_x = (size - new_width) / 2;
        let offset_y = (size - new_height) / 2;

        let src = Image::from_slice_u8(width, height, &mut self.rgb_buffer, PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);

        Resizer::new().resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.letterboxed_buffer.fill(LETTERBOX_COLOR);

        let resized_data = resized.buffer();
        let stride = size * 3;
        let row_bytes = (new_width * 3) as usize;

        for y in 0..new_height {
            let src_row = (y * new_width * 3) as usize;
            let dst_row = ((y + offset_y) * stride + offset_x * 3) as usize;

            self.letterboxed_buffer[dst_row..dst_row + row_bytes]
                .copy_from_slice(&resized_data[src_row..src_row + row_bytes]);
        }

        Ok(Letterbox {
            scale,
            offset_x: offset_x as f32,
            offset_y: offset_y as f32,
        })
    }

    /// HWC u8 to NCHW f32 in [0, 1].
    fn normalize(&self) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("normalize");

        let side = self.input_size as usize;
        let spatial = side * side;

        let mut output = vec![0.0f32; 3 * spatial];

        for (i, px) in self.letterboxed_buffer.chunks_exact(3).enumerate() {
            output[i] = px[0] as f32 / 255.0;
            output[i + spatial] = px[1] as f32 / 255.0;
            output[i + 2 * spatial] = px[2] as f32 / 255.0;
        }

        Ok(Array::from_shape_vec(IxDyn(&[1, 3, side, side]), output)?)
    }
}

impl Default for PreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}
