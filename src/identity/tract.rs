#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::Detection;
use crate::identity::{crop_region, FaceEncoder, FaceEncoding};

/// Embedding model input resolution (MobileFaceNet-family).
const INPUT_SIZE: u32 = 112;

/// Expected embedding dimensionality.
const ENCODING_LEN: usize = 128;

/// Tract-based face encoder.
///
/// Crops the detected face region, resizes it to the model input, and runs a
/// 128-d embedding ONNX model. Inputs are normalized to [-1, 1] NCHW.
pub struct TractEncoder {
    model: TypedSimplePlan<TypedModel>,
}

impl TractEncoder {
    /// Load an embedding ONNX model from disk.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| {
                format!(
                    "failed to load embedding model from {}",
                    model_path.display()
                )
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize embedding model")?
            .into_runnable()
            .context("failed to build runnable embedding model")?;
        Ok(Self { model })
    }

    fn build_input(&self, crop: &[u8], crop_w: usize, crop_h: usize) -> Tensor {
        let s = INPUT_SIZE as usize;
        let input =
            tract_ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, channel, y, x)| {
                let src_y =
                    (((y as f64 + 0.5) * crop_h as f64 / s as f64) as usize).min(crop_h - 1);
                let src_x =
                    (((x as f64 + 0.5) * crop_w as f64 / s as f64) as usize).min(crop_w - 1);
                let idx = (src_y * crop_w + src_x) * 3 + channel;
                (crop[idx] as f32 - 127.5) / 127.5
            });
        input.into_tensor()
    }
}

impl FaceEncoder for TractEncoder {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn encode(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        region: &Detection,
    ) -> Result<Option<FaceEncoding>> {
        let crop = match crop_region(pixels, width, height, region) {
            Some(crop) => crop,
            None => return Ok(None),
        };

        let x0 = ((region.x * width as f32) as u32).min(width.saturating_sub(1));
        let x1 = (((region.x + region.w) * width as f32).ceil() as u32).clamp(x0 + 1, width);
        let crop_w = (x1 - x0) as usize;
        let crop_h = crop.len() / 3 / crop_w;
        if crop_w == 0 || crop_h == 0 {
            return Ok(None);
        }

        let input = self.build_input(&crop, crop_w, crop_h);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("embedding inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("embedding model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("embedding output tensor was not f32")?;
        let values: Vec<f32> = view.iter().copied().collect();
        if values.len() != ENCODING_LEN {
            return Err(anyhow!(
                "embedding model produced {} values, expected {}",
                values.len(),
                ENCODING_LEN
            ));
        }

        Ok(Some(FaceEncoding::new(values)))
    }
}
