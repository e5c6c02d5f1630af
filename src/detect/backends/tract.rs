#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{nms, Detection, DetectionResult};

/// Model input resolution (BlazeFace short-range family).
const INPUT_SIZE: u32 = 128;

/// Number of anchors produced by the short-range model.
const NUM_ANCHORS: usize = 896;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f32 = 0.3;

/// Tract-based single-class detector for BlazeFace-family ONNX models.
///
/// One instance serves one capability; the daemon loads the face model and
/// the secondary-object model as two separate instances. Expects two model
/// outputs: anchor-relative box regressors `[1, 896, 16]` and raw logit
/// scores `[1, 896, 1]`.
pub struct TractDetector {
    model: TypedSimplePlan<TypedModel>,
    capability: DetectionCapability,
    confidence_threshold: f32,
    anchors: Vec<[f32; 2]>,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, capability: DetectionCapability) -> Result<Self> {
        let model_path = model_path.as_ref();
        let size = INPUT_SIZE as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            capability,
            confidence_threshold: 0.5,
            anchors: generate_anchors(),
        })
    }

    /// Override the default confidence threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }
        if width == 0 || height == 0 {
            return Err(anyhow!("empty frame"));
        }

        // Nearest-neighbor resize to the model input, normalized to [0,1] NCHW.
        let src_w = width as usize;
        let src_h = height as usize;
        let s = INPUT_SIZE as usize;
        let input =
            tract_ndarray::Array4::from_shape_fn((1, 3, s, s), |(_, channel, y, x)| {
                let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
                let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
                let idx = (src_y * src_w + src_x) * 3 + channel;
                pixels[idx] as f32 / 255.0
            });

        Ok(input.into_tensor())
    }

    fn decode_outputs(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        if outputs.len() < 2 {
            return Err(anyhow!(
                "model expected to produce 2 outputs, got {}",
                outputs.len()
            ));
        }
        let regressors = outputs[0]
            .to_array_view::<f32>()
            .context("regressor output tensor was not f32")?;
        let scores = outputs[1]
            .to_array_view::<f32>()
            .context("score output tensor was not f32")?;
        let reg_data = regressors
            .as_slice()
            .ok_or_else(|| anyhow!("regressor tensor not contiguous"))?;
        let score_data = scores
            .as_slice()
            .ok_or_else(|| anyhow!("score tensor not contiguous"))?;

        let mut detections = Vec::new();
        let num_anchors = self.anchors.len().min(score_data.len());

        for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
            let score = sigmoid(raw_score);
            if score < self.confidence_threshold {
                continue;
            }

            let anchor = &self.anchors[i];
            let reg_offset = i * 16;
            if reg_offset + 4 > reg_data.len() {
                break;
            }

            // Anchor-relative center/size deltas, normalized by input size.
            let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
            let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
            let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
            let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

            let x1 = (cx - w / 2.0).clamp(0.0, 1.0);
            let y1 = (cy - h / 2.0).clamp(0.0, 1.0);
            let x2 = (cx + w / 2.0).clamp(0.0, 1.0);
            let y2 = (cy + h / 2.0).clamp(0.0, 1.0);
            if x2 <= x1 || y2 <= y1 {
                continue;
            }

            detections.push(Detection {
                x: x1,
                y: y1,
                w: x2 - x1,
                h: y2 - y1,
                confidence: score,
            });
        }

        Ok(nms(detections, NMS_IOU_THRESH))
    }
}

impl DetectorBackend for TractDetector {
    fn name(&self) -> &'static str {
        match self.capability {
            DetectionCapability::FrontalFace => "tract-face",
            DetectionCapability::FullBody => "tract-body",
        }
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        capability == self.capability
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let detections = self.decode_outputs(outputs)?;
        Ok(DetectionResult { detections })
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; (INPUT_SIZE * INPUT_SIZE * 3) as usize];
        self.detect(&blank, INPUT_SIZE, INPUT_SIZE)?;
        Ok(())
    }
}

/// Generate anchors for the short-range model.
///
/// Two feature map sizes, 16x16 and 8x8, with 2 and 6 anchors per cell.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anchor_count_matches_short_range_layout() {
        let anchors = generate_anchors();
        // 16x16 grid x 2 anchors + 8x8 grid x 6 anchors = 512 + 384 = 896
        assert_eq!(anchors.len(), NUM_ANCHORS);
    }

    #[test]
    fn anchors_stay_in_unit_range() {
        for a in generate_anchors() {
            assert!(a[0] > 0.0 && a[0] < 1.0);
            assert!(a[1] > 0.0 && a[1] < 1.0);
        }
    }

    #[test]
    fn sigmoid_midpoint_and_saturation() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!((sigmoid(10.0) - 1.0).abs() < 0.001);
        assert!(sigmoid(-10.0) < 0.001);
    }
}
