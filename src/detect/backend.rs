use anyhow::Result;
use image::RgbImage;

use super::result::Detection;

/// Detection source seam.
///
/// Backends are opaque object detectors: given an RGB image they return every
/// object above their own confidence threshold, in source-image pixel
/// coordinates. A failed inference must be reported as `Err`, never as an
/// empty list, so callers can tell "nothing found" from "could not look".
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names indexed by class id.
    fn class_names(&self) -> &[String];

    /// Run detection on one image.
    ///
    /// Implementations treat the image as read-only and must not retain it
    /// past the call.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
