//! Image and video analysis on top of a shared detector backend.
//!
//! `ThreatAnalyzer` is the single entry point used by the HTTP API and the
//! command-line tool. It owns no model state itself: detection goes through a
//! [`SharedBackend`] that is locked once per image or sampled frame.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use base64::Engine as _;
use image::RgbImage;

use crate::config::MarEyeConfig;
#[cfg(feature = "backend-tract")]
use crate::detect::{TractBackend, TractSettings};
use crate::detect::{BackendRegistry, Detection, SharedBackend, StubBackend};
use crate::error::{ThreatError, ThreatResult};
use crate::ingest::{fit_within, load_image, FileConfig, FileSource};
use crate::render::{encode_jpeg, AnnotatedRenderer};
use crate::report::{ImageMetadata, ImageReport, VideoReport};
use crate::threat::{round_to, FrameAssessment};
use crate::video::{sample_video, validate_frame_interval, VideoAssessment};

#[derive(Clone, Debug)]
pub struct AnalyzerSettings {
    pub model_path: PathBuf,
    /// Detections below this confidence are discarded.
    pub confidence_threshold: f32,
    pub max_image_size: u32,
    pub frame_interval: u32,
}

impl AnalyzerSettings {
    pub fn from_config(cfg: &MarEyeConfig) -> Self {
        Self {
            model_path: cfg.model.path.clone(),
            confidence_threshold: cfg.model.confidence_threshold,
            max_image_size: cfg.image.max_size,
            frame_interval: cfg.video.frame_interval,
        }
    }
}

/// Register the backends available in this build and select the configured one.
pub fn build_registry(cfg: &MarEyeConfig) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    match cfg.model.backend.as_str() {
        "stub" => {}
        #[cfg(feature = "backend-tract")]
        "tract" => {
            registry.register(TractBackend::new(TractSettings {
                model_path: cfg.model.path.clone(),
                input_size: cfg.model.input_size,
                confidence_threshold: cfg.model.confidence_threshold,
                iou_threshold: cfg.model.iou_threshold,
                class_names: cfg.model.classes.clone(),
            })?);
        }
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    }
    registry.register(StubBackend::new().with_class_names(cfg.model.classes.clone()));
    Ok(registry)
}

/// A finished image analysis. The image is kept for annotation.
pub struct ImageAnalysis {
    pub report: ImageReport,
    pub assessment: FrameAssessment,
    /// The analyzed (possibly downscaled) image.
    pub image: RgbImage,
}

pub struct ThreatAnalyzer {
    backend: SharedBackend,
    backend_name: String,
    settings: AnalyzerSettings,
    renderer: AnnotatedRenderer,
}

impl ThreatAnalyzer {
    pub fn new(backend: SharedBackend, settings: AnalyzerSettings) -> Result<Self> {
        let backend_name = backend
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?
            .name()
            .to_string();
        Ok(Self {
            backend,
            backend_name,
            settings,
            renderer: AnnotatedRenderer::new(),
        })
    }

    /// Build the configured backend, warm it up and load the label font if any.
    pub fn from_config(cfg: &MarEyeConfig) -> Result<Self> {
        let registry = build_registry(cfg)?;
        let backend = registry
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?;
        backend
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?
            .warm_up()?;
        let mut analyzer = Self::new(backend, AnalyzerSettings::from_config(cfg))?;
        if let Some(font) = &cfg.image.font_path {
            analyzer = analyzer.with_renderer(AnnotatedRenderer::with_font_file(font)?);
        }
        Ok(analyzer)
    }

    pub fn with_renderer(mut self, renderer: AnnotatedRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// False when detection runs on the stub backend, which finds nothing.
    pub fn model_loaded(&self) -> bool {
        self.backend_name != "stub"
    }

    /// Class names reported by the backend, indexed by class id.
    pub fn class_names(&self) -> Vec<String> {
        match self.backend.lock() {
            Ok(backend) => backend.class_names().to_vec(),
            Err(_) => Vec::new(),
        }
    }

    /// Run the backend on one image and drop detections under the threshold.
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let mut backend = self
            .backend
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))?;
        let threshold = self.settings.confidence_threshold;
        Ok(backend
            .detect(image)?
            .into_iter()
            .filter(|d| d.confidence >= threshold)
            .collect())
    }

    pub fn analyze_image(&self, path: &Path) -> ThreatResult<ImageAnalysis> {
        let loaded = load_image(path, self.settings.max_image_size)?;
        let detections = self
            .detect(&loaded.image)
            .map_err(|e| ThreatError::detection(format!("{:#}", e)))?;
        let assessment = FrameAssessment::assess(detections);
        let metadata = ImageMetadata {
            image_path: path.display().to_string(),
            image_width: loaded.width(),
            image_height: loaded.height(),
            image_size_kb: round_to(loaded.file_size_bytes as f64 / 1024.0, 2),
            model_used: self.settings.model_path.display().to_string(),
            confidence_threshold: self.settings.confidence_threshold,
            detection_timestamp: timestamp_now(),
        };
        let report = ImageReport::new(&assessment, metadata);

        log::info!(
            "image {}: {} threats, overall {} ({:.3})",
            path.display(),
            report.threat_count,
            report.overall_threat_level,
            report.overall_threat_score
        );
        Ok(ImageAnalysis {
            report,
            assessment,
            image: loaded.image,
        })
    }

    /// Overlay for an analyzed image; `None` when nothing was detected.
    pub fn annotate(&self, analysis: &ImageAnalysis) -> Option<RgbImage> {
        self.renderer.render(&analysis.image, &analysis.assessment)
    }

    /// Overlay as a `data:image/jpeg;base64,...` URI.
    pub fn annotated_data_uri(&self, analysis: &ImageAnalysis) -> Result<Option<String>> {
        let Some(annotated) = self.annotate(analysis) else {
            return Ok(None);
        };
        let jpeg = encode_jpeg(&annotated)?;
        Ok(Some(format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(jpeg)
        )))
    }

    /// Sample a video file. `frame_interval` falls back to the configured one.
    pub fn assess_video(&self, path: &Path, frame_interval: Option<u32>) -> ThreatResult<VideoAssessment> {
        let interval = frame_interval.unwrap_or(self.settings.frame_interval);
        validate_frame_interval(interval)?;

        let mut source = FileSource::open(FileConfig::new(path.to_string_lossy())).map_err(|e| {
            log::warn!("cannot open video {}: {:#}", path.display(), e);
            ThreatError::SourceUnavailable("Failed to open video file".to_string())
        })?;
        let max_size = self.settings.max_image_size;
        let assessment = sample_video(&mut source, interval, |image| {
            match fit_within(image, max_size) {
                Some(resized) => self.detect(&resized),
                None => self.detect(image),
            }
        })?;

        log::info!(
            "video {}: {} of {} sampled frames with threats, overall {}",
            path.display(),
            assessment.frames_with_detections(),
            assessment.processed_frames,
            assessment.overall_level
        );
        Ok(assessment)
    }

    pub fn analyze_video(&self, path: &Path, frame_interval: Option<u32>) -> ThreatResult<VideoReport> {
        self.assess_video(path, frame_interval)
            .map(|assessment| VideoReport::from_assessment(&assessment))
    }
}

fn timestamp_now() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
