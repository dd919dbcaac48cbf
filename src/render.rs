//! Annotated overlay rendering.
//!
//! Draws one box per classified detection, colored by threat level, with a
//! filled label tag above it. Labels use the embedded DejaVu Sans unless a
//! font file is configured.

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::threat::{ClassifiedDetection, FrameAssessment};

const STROKE_PX: i32 = 2;
const LABEL_SCALE: f32 = 18.0;
const LABEL_PADDING: u32 = 10;
const JPEG_QUALITY: u8 = 90;
/// Glyph box assumed for tag sizing when no font is loaded.
const FALLBACK_GLYPH: (u32, u32) = (9, 13);

const DEFAULT_FONT: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

fn default_font() -> Option<FontArc> {
    match FontArc::try_from_slice(DEFAULT_FONT) {
        Ok(font) => Some(font),
        Err(err) => {
            log::warn!("embedded label font unusable, drawing tags without text: {}", err);
            None
        }
    }
}

/// `"{class} {confidence:.1}%"`, e.g. `"Submarine 85.0%"`.
pub fn label_text(detection: &ClassifiedDetection) -> String {
    format!(
        "{} {:.1}%",
        detection.detection.class_name,
        detection.detection.confidence as f64 * 100.0
    )
}

pub struct AnnotatedRenderer {
    font: Option<FontArc>,
}

impl Default for AnnotatedRenderer {
    fn default() -> Self {
        Self {
            font: default_font(),
        }
    }
}

impl AnnotatedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TTF/OTF font for label text in place of the embedded one.
    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        Ok(Self { font: Some(font) })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw `frame` onto a copy of `image`. Returns `None` when there is nothing to draw.
    pub fn render(&self, image: &RgbImage, frame: &FrameAssessment) -> Option<RgbImage> {
        if !frame.has_detections() {
            return None;
        }
        let mut canvas = image.clone();
        for detection in &frame.detections {
            self.draw_detection(&mut canvas, detection);
        }
        Some(canvas)
    }

    fn draw_detection(&self, canvas: &mut RgbImage, detection: &ClassifiedDetection) {
        let color = Rgb(detection.level.color());
        let bbox = detection.detection.bbox;
        let x1 = bbox.x1 as i32;
        let y1 = bbox.y1 as i32;
        let width = (bbox.width() as u32).max(1);
        let height = (bbox.height() as u32).max(1);

        for inset in 0..STROKE_PX {
            let w = width.saturating_sub(2 * inset as u32).max(1);
            let h = height.saturating_sub(2 * inset as u32).max(1);
            draw_hollow_rect_mut(canvas, Rect::at(x1 + inset, y1 + inset).of_size(w, h), color);
        }

        let label = label_text(detection);
        let (text_w, text_h) = match &self.font {
            Some(font) => text_size(PxScale::from(LABEL_SCALE), font, &label),
            None => (
                FALLBACK_GLYPH.0 * label.chars().count() as u32,
                FALLBACK_GLYPH.1,
            ),
        };
        let tag_h = text_h + LABEL_PADDING;
        let tag_y = (y1 - tag_h as i32).max(0);
        draw_filled_rect_mut(canvas, Rect::at(x1, tag_y).of_size(text_w.max(1), tag_h), color);

        if let Some(font) = &self.font {
            draw_text_mut(
                canvas,
                Rgb([255, 255, 255]),
                x1,
                tag_y + (LABEL_PADDING / 2) as i32,
                PxScale::from(LABEL_SCALE),
                font,
                &label,
            );
        }
    }
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY)
        .encode_image(image)
        .context("encode annotated image as JPEG")?;
    Ok(buf)
}

/// Write an image; the format follows the file extension.
pub fn write(image: &RgbImage, path: &Path) -> Result<()> {
    image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use crate::threat::ThreatLevel;

    fn frame_with(class: &str, confidence: f32) -> FrameAssessment {
        FrameAssessment::assess(vec![Detection::new(
            0,
            class,
            confidence,
            BoundingBox::new(10.0, 40.0, 50.0, 70.0),
        )])
    }

    #[test]
    fn label_shows_class_and_percentage() {
        let frame = frame_with("Submarine", 0.8534);
        assert_eq!(label_text(&frame.detections[0]), "Submarine 85.3%");
    }

    #[test]
    fn nothing_to_draw_without_detections() {
        let image = RgbImage::new(100, 100);
        assert!(AnnotatedRenderer::new().render(&image, &FrameAssessment::empty()).is_none());
    }

    #[test]
    fn box_is_drawn_in_level_color_without_touching_input() {
        let image = RgbImage::new(100, 100);
        let frame = frame_with("Submarine", 0.9);
        assert_eq!(frame.detections[0].level, ThreatLevel::Critical);

        let out = AnnotatedRenderer::new().render(&image, &frame).unwrap();
        assert_eq!(out.get_pixel(10, 55), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(30, 55), &Rgb([0, 0, 0]));
        assert_eq!(image.get_pixel(10, 55), &Rgb([0, 0, 0]));
    }

    #[test]
    fn label_tag_sits_above_the_box() {
        let image = RgbImage::new(100, 100);
        let frame = frame_with("divers", 0.3);
        let out = AnnotatedRenderer::new().render(&image, &frame).unwrap();
        // LOW is green; the bottom padding row of the tag sits just above y1 = 40.
        assert_eq!(out.get_pixel(12, 38), &Rgb([0, 255, 0]));
    }

    #[test]
    fn label_text_is_drawn_inside_the_tag() {
        let image = RgbImage::new(200, 120);
        let frame = FrameAssessment::assess(vec![Detection::new(
            1,
            "Submarine",
            0.9,
            BoundingBox::new(10.0, 60.0, 150.0, 110.0),
        )]);
        let renderer = AnnotatedRenderer::new();
        assert!(renderer.has_font());

        let out = renderer.render(&image, &frame).unwrap();
        let red = Rgb([255, 0, 0]);
        let black = Rgb([0, 0, 0]);
        // Tag occupies the rows just above y1 = 60.
        let glyph_pixels = (10..150u32)
            .flat_map(|x| (30..60u32).map(move |y| (x, y)))
            .filter(|&(x, y)| {
                let px = out.get_pixel(x, y);
                *px != red && *px != black
            })
            .count();
        assert!(glyph_pixels > 20, "only {} glyph pixels", glyph_pixels);
    }

    #[test]
    fn missing_font_file_is_an_error() {
        assert!(AnnotatedRenderer::with_font_file(Path::new("/nonexistent/font.ttf")).is_err());
    }

    #[test]
    fn jpeg_encoding_produces_jfif_bytes() {
        let bytes = encode_jpeg(&RgbImage::new(8, 8)).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }
}
