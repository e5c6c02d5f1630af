//! Decoded frame container.
//!
//! Frames enter the daemon as base64 strings inside JSON request bodies, or
//! as raw image files through the probe tool. Both paths land here: bytes are
//! decoded in-memory into an owned RGB8 buffer and never written to disk.
//! Pixel data is zeroized when the frame is dropped.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroize;

use crate::MonitorError;

/// Hard cap on encoded frame payloads. Anything larger is rejected before
/// image decoding starts.
pub const MAX_IMAGE_BYTES: usize = 8 * 1024 * 1024;

/// An owned, decoded RGB8 frame.
#[derive(Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    /// Decode an in-memory image (JPEG or PNG) into an RGB frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, MonitorError> {
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(MonitorError::Decode(format!(
                "image exceeds {} byte limit",
                MAX_IMAGE_BYTES
            )));
        }
        let image = image::load_from_memory(bytes)
            .map_err(|e| MonitorError::Decode(e.to_string()))?;
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(Self {
            data: rgb.into_raw(),
            width,
            height,
        })
    }

    /// Decode a base64-encoded image payload.
    pub fn from_base64(encoded: &str) -> Result<Self, MonitorError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| MonitorError::Decode(format!("invalid base64: {}", e)))?;
        Self::decode(&bytes)
    }

    /// Construct a frame from an already-decoded RGB8 buffer.
    ///
    /// Fails when the buffer length does not match `width * height * 3`.
    pub fn from_rgb8(data: Vec<u8>, width: u32, height: u32) -> Result<Self, MonitorError> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| MonitorError::Decode("frame dimensions overflow".to_string()))?;
        if data.len() != expected {
            return Err(MonitorError::Decode(format!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Read-only pixel access for detectors and encoders.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        // Zeroize pixel data on drop to limit the exposure window.
        self.data.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn encode_png(image: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image.clone())
            .write_to(&mut buf, ImageFormat::Png)
            .expect("png encode");
        buf.into_inner()
    }

    #[test]
    fn decodes_png_to_rgb() {
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(0, 0, image::Rgb([7, 11, 13]));
        let frame = Frame::decode(&encode_png(&img)).unwrap();
        assert_eq!(frame.width, 4);
        assert_eq!(frame.height, 3);
        assert_eq!(&frame.pixels()[..3], &[7, 11, 13]);
    }

    #[test]
    fn base64_roundtrip() {
        let img = RgbImage::new(2, 2);
        let encoded = BASE64.encode(encode_png(&img));
        let frame = Frame::from_base64(&encoded).unwrap();
        assert_eq!(frame.pixels().len(), 2 * 2 * 3);
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = Frame::from_base64("not&&base64!!").unwrap_err();
        assert!(matches!(err, MonitorError::Decode(_)));
    }

    #[test]
    fn rejects_undecodable_image_bytes() {
        let err = Frame::decode(b"these are not image bytes").unwrap_err();
        assert!(matches!(err, MonitorError::Decode(_)));
    }

    #[test]
    fn rejects_mismatched_rgb_buffer() {
        let err = Frame::from_rgb8(vec![0u8; 10], 4, 4).unwrap_err();
        assert!(matches!(err, MonitorError::Decode(_)));
    }
}
