use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::video::DEFAULT_FRAME_INTERVAL;

const DEFAULT_API_ADDR: &str = "0.0.0.0:10000";
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;
const DEFAULT_MODEL_PATH: &str = "best.onnx";
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_MAX_IMAGE_SIZE: u32 = 1280;
pub const DEFAULT_CLASSES: &[&str] = &[
    "Mines - v1 2025-05-15 8-03pm",
    "Submarine",
    "auv-rov",
    "divers",
    "mayin",
];
const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "https://mareye-frontend.vercel.app",
    "https://*.vercel.app",
];

#[derive(Debug, Deserialize, Default)]
struct MarEyeConfigFile {
    api: Option<ApiConfigFile>,
    model: Option<ModelConfigFile>,
    image: Option<ImageConfigFile>,
    video: Option<VideoConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
    max_upload_bytes: Option<u64>,
    allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    backend: Option<String>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
    classes: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ImageConfigFile {
    max_size: Option<u32>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    frame_interval: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct MarEyeConfig {
    pub api: ApiSettings,
    pub model: ModelSettings,
    pub image: ImageSettings,
    pub video: VideoSettings,
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub addr: String,
    pub max_upload_bytes: u64,
    /// CORS origins; `*` in a pattern matches any run of characters.
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub path: PathBuf,
    /// Detector backend name, e.g. `tract` or `stub`.
    pub backend: String,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    /// Class names indexed by model class id.
    pub classes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ImageSettings {
    /// Longest side accepted before downscaling.
    pub max_size: u32,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub frame_interval: u32,
}

pub fn default_backend() -> &'static str {
    if cfg!(feature = "backend-tract") {
        "tract"
    } else {
        "stub"
    }
}

impl Default for MarEyeConfig {
    fn default() -> Self {
        Self::from_file(MarEyeConfigFile::default())
    }
}

impl MarEyeConfig {
    /// Defaults, then the JSON file named by `MAREYE_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MAREYE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MarEyeConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let image = file.image.unwrap_or_default();
        let video = file.video.unwrap_or_default();

        Self {
            api: ApiSettings {
                addr: api.addr.unwrap_or_else(|| DEFAULT_API_ADDR.to_string()),
                max_upload_bytes: api.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
                allowed_origins: api
                    .allowed_origins
                    .unwrap_or_else(|| to_strings(DEFAULT_ALLOWED_ORIGINS)),
            },
            model: ModelSettings {
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                backend: model
                    .backend
                    .unwrap_or_else(|| default_backend().to_string()),
                confidence_threshold: model
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                iou_threshold: model.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                input_size: model.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
                classes: model.classes.unwrap_or_else(|| to_strings(DEFAULT_CLASSES)),
            },
            image: ImageSettings {
                max_size: image.max_size.unwrap_or(DEFAULT_MAX_IMAGE_SIZE),
                font_path: image.font_path,
            },
            video: VideoSettings {
                frame_interval: video.frame_interval.unwrap_or(DEFAULT_FRAME_INTERVAL),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(addr) = std::env::var("MAREYE_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api.addr = addr;
            }
        } else if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| anyhow!("PORT must be a TCP port number"))?;
            self.api.addr = format!("0.0.0.0:{}", port);
        }
        if let Ok(bytes) = std::env::var("MAREYE_MAX_UPLOAD_BYTES") {
            self.api.max_upload_bytes = parse_env("MAREYE_MAX_UPLOAD_BYTES", &bytes)?;
        }
        if let Ok(origins) = std::env::var("MAREYE_CORS_ORIGINS") {
            let parsed = split_csv(&origins);
            if !parsed.is_empty() {
                self.api.allowed_origins = parsed;
            }
        }
        if let Ok(path) = std::env::var("MAREYE_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.model.path = PathBuf::from(path);
            }
        }
        if let Ok(backend) = std::env::var("MAREYE_BACKEND") {
            if !backend.trim().is_empty() {
                self.model.backend = backend.trim().to_string();
            }
        }
        if let Ok(threshold) = std::env::var("MAREYE_CONFIDENCE_THRESHOLD") {
            self.model.confidence_threshold = parse_env("MAREYE_CONFIDENCE_THRESHOLD", &threshold)?;
        }
        if let Ok(classes) = std::env::var("MAREYE_CLASSES") {
            let parsed = split_csv(&classes);
            if !parsed.is_empty() {
                self.model.classes = parsed;
            }
        }
        if let Ok(size) = std::env::var("MAX_IMAGE_SIZE") {
            self.image.max_size = parse_env("MAX_IMAGE_SIZE", &size)?;
        }
        if let Ok(path) = std::env::var("MAREYE_FONT_PATH") {
            if !path.trim().is_empty() {
                self.image.font_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(interval) = std::env::var("MAREYE_FRAME_INTERVAL") {
            self.video.frame_interval = parse_env("MAREYE_FRAME_INTERVAL", &interval)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.video.frame_interval == 0 {
            return Err(anyhow!("video.frame_interval must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.model.confidence_threshold) {
            return Err(anyhow!("model.confidence_threshold must be within [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.model.iou_threshold) {
            return Err(anyhow!("model.iou_threshold must be within [0, 1]"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model.input_size must be greater than zero"));
        }
        if self.model.classes.is_empty() {
            return Err(anyhow!("model.classes must not be empty"));
        }
        if self.image.max_size == 0 {
            return Err(anyhow!("image.max_size must be greater than zero"));
        }
        if self.api.max_upload_bytes == 0 {
            return Err(anyhow!("api.max_upload_bytes must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<MarEyeConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} has an invalid value '{}'", name, value))
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
