use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::Detection;
use crate::identity::{crop_region, FaceEncoder, FaceEncoding};

/// Encoding dimensionality, matching the 128-d contract of the tract encoder.
const ENCODING_LEN: usize = 128;

/// Stub encoder for testing. Derives a deterministic encoding from a digest
/// of the cropped region: identical crops produce identical encodings, and
/// any two distinct crops land far apart relative to realistic thresholds.
pub struct StubEncoder;

impl StubEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StubEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceEncoder for StubEncoder {
    fn name(&self) -> &'static str {
        "stub"
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

        let seed: [u8; 32] = Sha256::digest(&crop).into();
        let mut values = Vec::with_capacity(ENCODING_LEN);
        let mut counter: u32 = 0;
        while values.len() < ENCODING_LEN {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(counter.to_le_bytes());
            let block: [u8; 32] = hasher.finalize().into();
            for byte in block {
                if values.len() == ENCODING_LEN {
                    break;
                }
                values.push(byte as f32 / 255.0 * 10.0);
            }
            counter += 1;
        }

        Ok(Some(FaceEncoding::new(values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::DEFAULT_MATCH_THRESHOLD;

    fn full_frame() -> Detection {
        Detection {
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
            confidence: 1.0,
        }
    }

    #[test]
    fn identical_crops_match() {
        let mut encoder = StubEncoder::new();
        let pixels = vec![42u8; 4 * 4 * 3];
        let a = encoder.encode(&pixels, 4, 4, &full_frame()).unwrap().unwrap();
        let b = encoder.encode(&pixels, 4, 4, &full_frame()).unwrap().unwrap();
        assert_eq!(a.distance(&b), 0.0);
        assert!(a.matches(&b, DEFAULT_MATCH_THRESHOLD));
    }

    #[test]
    fn distinct_crops_do_not_match() {
        let mut encoder = StubEncoder::new();
        let first = vec![1u8; 4 * 4 * 3];
        let second = vec![2u8; 4 * 4 * 3];
        let a = encoder.encode(&first, 4, 4, &full_frame()).unwrap().unwrap();
        let b = encoder
            .encode(&second, 4, 4, &full_frame())
            .unwrap()
            .unwrap();
        assert!(a.distance(&b) > DEFAULT_MATCH_THRESHOLD);
    }

    #[test]
    fn encoding_has_expected_length() {
        let mut encoder = StubEncoder::new();
        let pixels = vec![0u8; 2 * 2 * 3];
        let encoding = encoder
            .encode(&pixels, 2, 2, &full_frame())
            .unwrap()
            .unwrap();
        assert_eq!(encoding.len(), ENCODING_LEN);
    }

    #[test]
    fn empty_frame_yields_no_encoding() {
        let mut encoder = StubEncoder::new();
        assert!(encoder.encode(&[], 0, 0, &full_frame()).unwrap().is_none());
    }
}
