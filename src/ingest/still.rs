use std::path::Path;

use image::imageops::FilterType;
use image::{ImageReader, RgbImage};

use crate::error::{ThreatError, ThreatResult};

/// A decoded still image, downscaled to the configured maximum side.
pub struct LoadedImage {
    pub image: RgbImage,
    pub original_width: u32,
    pub original_height: u32,
    pub file_size_bytes: u64,
}

impl LoadedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn was_resized(&self) -> bool {
        self.original_width != self.width() || self.original_height != self.height()
    }
}

/// Decode an image file and shrink it so its longer side is at most `max_size`.
///
/// Missing or undecodable files are `SourceUnavailable`.
pub fn load_image(path: &Path, max_size: u32) -> ThreatResult<LoadedImage> {
    let file_size_bytes = std::fs::metadata(path)
        .map_err(|_| {
            ThreatError::SourceUnavailable(format!("Image file not found: {}", path.display()))
        })?
        .len();

    let decoded = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| {
            ThreatError::SourceUnavailable(format!("Could not load image: {}: {}", path.display(), e))
        })?
        .decode()
        .map_err(|e| {
            ThreatError::SourceUnavailable(format!("Could not load image: {}: {}", path.display(), e))
        })?;

    let image = decoded.to_rgb8();
    let (original_width, original_height) = image.dimensions();
    let image = downscale(image, max_size);
    if image.dimensions() != (original_width, original_height) {
        log::debug!(
            "resized {} from {}x{} to {}x{}",
            path.display(),
            original_width,
            original_height,
            image.width(),
            image.height()
        );
    }

    Ok(LoadedImage {
        image,
        original_width,
        original_height,
        file_size_bytes,
    })
}

fn downscale(image: RgbImage, max_size: u32) -> RgbImage {
    fit_within(&image, max_size).unwrap_or(image)
}

/// Resized copy whose longer side is `max_size`, or `None` if `image` already fits.
pub fn fit_within(image: &RgbImage, max_size: u32) -> Option<RgbImage> {
    let (width, height) = image.dimensions();
    let longest = width.max(height);
    if max_size == 0 || longest <= max_size {
        return None;
    }
    let scale = max_size as f64 / longest as f64;
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    Some(image::imageops::resize(image, new_width, new_height, FilterType::Triangle))
}
