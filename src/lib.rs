//! MarEye marine hazard threat assessment.
//!
//! Turns raw object detections (class, confidence, box) from a marine hazard
//! detector into graded threat assessments for single images and sampled
//! video, and serves them over a small HTTP API.
//!
//! # Module Structure
//!
//! - `threat`: per-detection classification and frame-level aggregation
//! - `detect`: detector backend seam (`DetectorBackend`), stub and tract backends
//! - `frame` / `ingest`: decoded frames, still images and video frame sources
//! - `video`: frame sampling and video-level aggregation
//! - `render`: annotated overlays
//! - `report`: JSON report types
//! - `analyzer`: image/video analysis entry point used by the binaries
//! - `api`: HTTP upload API
//! - `config`: service configuration (file + environment)

pub mod analyzer;
pub mod api;
pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod render;
pub mod report;
pub mod threat;
pub mod video;

pub use analyzer::{build_registry, AnalyzerSettings, ImageAnalysis, ThreatAnalyzer};
pub use config::MarEyeConfig;
pub use detect::{
    BackendRegistry, BoundingBox, Detection, DetectorBackend, SharedBackend, StubBackend,
    StubResponse,
};
pub use error::{ThreatError, ThreatResult};
pub use frame::RawFrame;
pub use ingest::{FileConfig, FileSource, FrameSource, VideoMetadata};
pub use render::AnnotatedRenderer;
pub use report::{FailureReport, ImageReport, ThreatEntry, VideoReport};
pub use threat::{aggregate, classify, FrameAssessment, ThreatLevel};
pub use video::{sample_video, VideoAggregator, VideoAssessment, DEFAULT_FRAME_INTERVAL};
