#![cfg(feature = "backend-tract")]

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::nms::non_max_suppression;
use crate::detect::result::{BoundingBox, Detection};

/// Settings for [`TractBackend`].
#[derive(Clone, Debug)]
pub struct TractSettings {
    pub model_path: PathBuf,
    /// Square model input side in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub class_names: Vec<String>,
}

/// Tract-based backend for YOLOv8-style ONNX exports.
///
/// The model is expected to take a `1x3xSxS` RGB tensor scaled to `0..1` and
/// to produce `1x(4+C)xN` candidates (`cx, cy, w, h` followed by one score per
/// class) in input-pixel units.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>,
    settings: TractSettings,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new(settings: TractSettings) -> Result<Self> {
        let side = settings.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(&settings.model_path)
            .with_context(|| {
                format!(
                    "failed to load ONNX model from {}",
                    settings.model_path.display()
                )
            })?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract backend loaded {} ({} classes, input {}x{})",
            settings.model_path.display(),
            settings.class_names.len(),
            side,
            side
        );
        Ok(Self { model, settings })
    }

    fn build_input(&self, image: &RgbImage) -> Tensor {
        let side = self.settings.input_size;
        let resized = image::imageops::resize(image, side, side, FilterType::Triangle);
        let side = side as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        input.into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not a 1x(4+C)xN tensor")?;

        let class_count = self.settings.class_names.len();
        let expected_rows = 4 + class_count;
        // Some exports emit 1xNx(4+C); normalize to rows = attributes.
        let view = if view.shape()[1] == expected_rows {
            view
        } else if view.shape()[2] == expected_rows {
            view.permuted_axes([0, 2, 1])
        } else {
            return Err(anyhow!(
                "model output shape {:?} does not match {} configured classes",
                view.shape(),
                class_count
            ));
        };

        let side = self.settings.input_size as f32;
        let sx = width as f32 / side;
        let sy = height as f32 / side;

        let mut candidates = Vec::new();
        for i in 0..view.shape()[2] {
            let (class_id, score) = (0..class_count)
                .map(|c| (c, view[[0, 4 + c, i]]))
                .fold((0, f32::NEG_INFINITY), |best, cur| if cur.1 > best.1 { cur } else { best });
            if !score.is_finite() || score < self.settings.confidence_threshold {
                continue;
            }
            let bbox = BoundingBox::from_center(
                view[[0, 0, i]] * sx,
                view[[0, 1, i]] * sy,
                view[[0, 2, i]] * sx,
                view[[0, 3, i]] * sy,
            )
            .clamp_to(width, height);
            candidates.push(Detection::new(
                class_id,
                self.settings.class_names[class_id].clone(),
                score,
                bbox,
            ));
        }

        Ok(non_max_suppression(candidates, self.settings.iou_threshold))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> &[String] {
        &self.settings.class_names
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, image.width(), image.height())
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.settings.input_size;
        self.detect(&RgbImage::new(side, side)).map(|_| ())
    }
}
