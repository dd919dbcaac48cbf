//! Decoded frames handed from a frame source to the detector.
//!
//! A `RawFrame` owns its pixel buffer. The sampling loop takes ownership of
//! each frame and drops it before asking the source for the next one, so at
//! most one decoded frame is alive per analysis.

use anyhow::{anyhow, Result};
use image::RgbImage;

/// One decoded RGB frame and its 0-based position in the source.
pub struct RawFrame {
    index: u64,
    image: RgbImage,
}

impl RawFrame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Wrap a packed RGB24 buffer. The length must be exactly `width * height * 3`.
    pub fn from_rgb(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("RGB frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("RGB buffer does not fit {}x{}", width, height))?;
        Ok(Self { index, image })
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_buffer_length_is_validated() {
        assert!(RawFrame::from_rgb(0, 2, 2, vec![0u8; 12]).is_ok());
        let err = RawFrame::from_rgb(0, 2, 2, vec![0u8; 11]).err().unwrap();
        assert!(err.to_string().contains("length mismatch"));
    }

    #[test]
    fn frame_exposes_dimensions_and_index() {
        let frame = RawFrame::new(30, RgbImage::new(64, 48));
        assert_eq!(frame.index(), 30);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
    }
}
