use anyhow::Result;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{Detection, DetectionResult};

/// Stub backend for testing. Reads the detection count from the frame's
/// first pixel: the R channel encodes the face count, the G channel the
/// secondary-object count. Synthesized boxes cover the full frame so
/// downstream crops stay in bounds.
pub struct StubDetector {
    capability: DetectionCapability,
}

impl StubDetector {
    pub fn new(capability: DetectionCapability) -> Self {
        Self { capability }
    }

    fn marker_count(&self, pixels: &[u8]) -> usize {
        let channel = match self.capability {
            DetectionCapability::FrontalFace => 0,
            DetectionCapability::FullBody => 1,
        };
        pixels.get(channel).copied().unwrap_or(0) as usize
    }
}

impl DetectorBackend for StubDetector {
    fn name(&self) -> &'static str {
        match self.capability {
            DetectionCapability::FrontalFace => "stub-face",
            DetectionCapability::FullBody => "stub-body",
        }
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        capability == self.capability
    }

    fn detect(&mut self, pixels: &[u8], _width: u32, _height: u32) -> Result<DetectionResult> {
        let count = self.marker_count(pixels);
        let detections = (0..count)
            .map(|i| Detection {
                x: 0.0,
                y: 0.0,
                w: 1.0,
                h: 1.0,
                confidence: 0.9 - (i as f32) * 0.01,
            })
            .collect();
        Ok(DetectionResult { detections })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn face_count_comes_from_red_channel() {
        let mut detector = StubDetector::new(DetectionCapability::FrontalFace);
        let mut pixels = vec![0u8; 2 * 2 * 3];
        pixels[0] = 3;
        pixels[1] = 1;

        let result = detector.detect(&pixels, 2, 2).unwrap();
        assert_eq!(result.count(), 3);
        assert!((result.primary().unwrap().confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn object_count_comes_from_green_channel() {
        let mut detector = StubDetector::new(DetectionCapability::FullBody);
        let mut pixels = vec![0u8; 2 * 2 * 3];
        pixels[1] = 2;

        let result = detector.detect(&pixels, 2, 2).unwrap();
        assert_eq!(result.count(), 2);
    }

    #[test]
    fn empty_frame_yields_no_detections() {
        let mut detector = StubDetector::new(DetectionCapability::FrontalFace);
        let result = detector.detect(&[], 0, 0).unwrap();
        assert_eq!(result.count(), 0);
    }
}
