//! Face encodings and the encoders that produce them.
//!
//! An encoding is a fixed-length f32 vector compared by Euclidean distance.
//! Two encodings within the match threshold are treated as the same person;
//! the default threshold of 0.6 follows the dlib-style comparison contract.

pub mod stub;
#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubEncoder;
#[cfg(feature = "backend-tract")]
pub use tract::TractEncoder;

use anyhow::Result;

use crate::detect::Detection;

/// Default distance threshold for an identity match.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// A fixed-length face embedding.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceEncoding(Vec<f32>);

impl FaceEncoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Euclidean distance to another encoding.
    ///
    /// Encodings of different lengths come from incompatible encoders and
    /// never match; the distance is reported as infinite.
    pub fn distance(&self, other: &FaceEncoding) -> f32 {
        if self.0.len() != other.0.len() {
            return f32::INFINITY;
        }
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt()
    }

    /// True when the distance to `other` is within `threshold`.
    pub fn matches(&self, other: &FaceEncoding, threshold: f32) -> bool {
        self.distance(other) <= threshold
    }
}

/// Face encoder trait.
///
/// Given a frame and a detected face region, produce an encoding. `None`
/// means the encoder could not extract a usable face from the region; the
/// frame processor treats that the same way as having no reference to
/// compare against.
pub trait FaceEncoder: Send {
    /// Encoder identifier.
    fn name(&self) -> &'static str;

    /// Encode the face inside `region` (normalized coordinates).
    fn encode(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        region: &Detection,
    ) -> Result<Option<FaceEncoding>>;
}

/// Extract the RGB bytes of a normalized region, clamped to frame bounds.
///
/// Returns `None` when the region collapses to zero pixels.
pub(crate) fn crop_region(
    pixels: &[u8],
    width: u32,
    height: u32,
    region: &Detection,
) -> Option<Vec<u8>> {
    if width == 0 || height == 0 {
        return None;
    }
    let x0 = ((region.x * width as f32) as u32).min(width.saturating_sub(1));
    let y0 = ((region.y * height as f32) as u32).min(height.saturating_sub(1));
    let x1 = (((region.x + region.w) * width as f32).ceil() as u32).clamp(x0 + 1, width);
    let y1 = (((region.y + region.h) * height as f32).ceil() as u32).clamp(y0 + 1, height);

    let mut out = Vec::with_capacity(((x1 - x0) * (y1 - y0) * 3) as usize);
    for y in y0..y1 {
        let row_start = ((y * width + x0) * 3) as usize;
        let row_end = ((y * width + x1) * 3) as usize;
        out.extend_from_slice(pixels.get(row_start..row_end)?);
    }
    Some(out)
}
