//! JSON reports.
//!
//! Field names and nesting match the wire format consumed by existing MarEye
//! clients. Optional fields are omitted rather than sent as `null`.

use serde::{Deserialize, Serialize};

use crate::error::ThreatError;
use crate::threat::{ClassifiedDetection, FrameAssessment, ThreatLevel};
use crate::video::{KeptFrame, VideoAssessment};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBoxEntry {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub width: f32,
    pub height: f32,
    pub center_x: f32,
    pub center_y: f32,
}

/// One classified detection as reported.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThreatEntry {
    /// 1-based position within the image or frame.
    pub id: usize,
    #[serde(rename = "class")]
    pub class_name: String,
    pub class_id: usize,
    pub confidence: f32,
    pub confidence_percentage: f32,
    pub threat_level: ThreatLevel,
    pub bounding_box: BoundingBoxEntry,
    pub area_pixels: f32,
    /// Box area as a percentage of the image area.
    pub relative_size: f64,
}

impl ThreatEntry {
    pub fn from_classified(id: usize, classified: &ClassifiedDetection, image_width: u32, image_height: u32) -> Self {
        let det = &classified.detection;
        let (center_x, center_y) = det.bbox.center();
        Self {
            id,
            class_name: det.class_name.clone(),
            class_id: det.class_id,
            confidence: det.confidence,
            confidence_percentage: det.confidence * 100.0,
            threat_level: classified.level,
            bounding_box: BoundingBoxEntry {
                x1: det.bbox.x1,
                y1: det.bbox.y1,
                x2: det.bbox.x2,
                y2: det.bbox.y2,
                width: det.bbox.width(),
                height: det.bbox.height(),
                center_x,
                center_y,
            },
            area_pixels: det.bbox.area(),
            relative_size: det.relative_size(image_width, image_height),
        }
    }
}

pub fn threat_entries(frame: &FrameAssessment, image_width: u32, image_height: u32) -> Vec<ThreatEntry> {
    frame
        .detections
        .iter()
        .enumerate()
        .map(|(i, d)| ThreatEntry::from_classified(i + 1, d, image_width, image_height))
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub image_path: String,
    pub image_width: u32,
    pub image_height: u32,
    pub image_size_kb: f64,
    pub model_used: String,
    pub confidence_threshold: f32,
    pub detection_timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageReport {
    pub success: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub threats: Vec<ThreatEntry>,
    pub threat_count: usize,
    pub overall_threat_level: ThreatLevel,
    pub overall_threat_score: f64,
    pub metadata: ImageMetadata,
    /// `data:image/jpeg;base64,...` overlay, only when threats were found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotated_image: Option<String>,
}

impl ImageReport {
    pub fn new(frame: &FrameAssessment, metadata: ImageMetadata) -> Self {
        Self {
            success: true,
            kind: None,
            filename: None,
            threats: threat_entries(frame, metadata.image_width, metadata.image_height),
            threat_count: frame.threat_count(),
            overall_threat_level: frame.overall_level,
            overall_threat_score: frame.overall_score,
            metadata,
            annotated_image: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadataEntry {
    pub duration_seconds: f64,
    pub fps: f64,
    pub total_frames: u64,
    pub processed_frames: u64,
    pub frame_interval: u32,
    pub resolution: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameEntry {
    pub frame_number: u64,
    pub timestamp: f64,
    pub threats: Vec<ThreatEntry>,
    pub threat_count: usize,
    pub threat_level: ThreatLevel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub frames_analyzed: u64,
    pub frames_with_detections: u64,
    pub detection_rate: f64,
    pub frames_failed: u64,
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncated_reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoReport {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    pub video_metadata: VideoMetadataEntry,
    /// Number of frames with at least one threat.
    pub total_detections: u64,
    pub total_threats: u64,
    pub overall_threat_level: ThreatLevel,
    pub frames_with_threats: Vec<FrameEntry>,
    pub summary: VideoSummary,
}

impl VideoReport {
    pub fn from_assessment(video: &VideoAssessment) -> Self {
        let meta = video.metadata;
        let frames = video
            .frame_results
            .iter()
            .map(|kept| frame_entry(kept, meta.width, meta.height))
            .collect();
        Self {
            success: true,
            kind: "video".to_string(),
            filename: None,
            video_metadata: VideoMetadataEntry {
                duration_seconds: video.duration_seconds(),
                fps: meta.fps,
                total_frames: meta.total_frames,
                processed_frames: video.processed_frames,
                frame_interval: video.frame_interval,
                resolution: meta.resolution(),
            },
            total_detections: video.total_detections(),
            total_threats: video.total_threat_count(),
            overall_threat_level: video.overall_level,
            frames_with_threats: frames,
            summary: VideoSummary {
                frames_analyzed: video.processed_frames,
                frames_with_detections: video.frames_with_detections(),
                detection_rate: video.detection_rate(),
                frames_failed: video.frames_failed,
                truncated: video.truncated.is_some(),
                truncated_reason: video.truncated.as_ref().map(ToString::to_string),
            },
        }
    }
}

fn frame_entry(kept: &KeptFrame, width: u32, height: u32) -> FrameEntry {
    FrameEntry {
        frame_number: kept.frame_index,
        timestamp: kept.timestamp,
        threats: threat_entries(&kept.assessment, width, height),
        threat_count: kept.assessment.threat_count(),
        threat_level: kept.assessment.overall_level,
    }
}

/// `{ "success": false, "error": "..." }`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureReport {
    pub success: bool,
    pub error: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl FailureReport {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            kind: None,
            filename: None,
        }
    }

    /// Tag the failure with the upload it belongs to.
    pub fn for_upload(mut self, kind: &str, filename: &str) -> Self {
        self.kind = Some(kind.to_string());
        self.filename = Some(filename.to_string());
        self
    }
}

impl From<&ThreatError> for FailureReport {
    fn from(err: &ThreatError) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection};
    use crate::ingest::VideoMetadata;
    use crate::video::VideoAggregator;

    fn metadata(width: u32, height: u32) -> ImageMetadata {
        ImageMetadata {
            image_path: "sonar.png".to_string(),
            image_width: width,
            image_height: height,
            image_size_kb: 12.5,
            model_used: "best.onnx".to_string(),
            confidence_threshold: 0.3,
            detection_timestamp: "2025-05-15 20:03:00".to_string(),
        }
    }

    #[test]
    fn image_report_uses_wire_field_names() {
        let frame = FrameAssessment::assess(vec![Detection::new(
            1,
            "Submarine",
            0.9,
            BoundingBox::new(10.0, 20.0, 50.0, 40.0),
        )]);
        let report = ImageReport::new(&frame, metadata(100, 100));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["threat_count"], 1);
        assert_eq!(json["overall_threat_level"], "CRITICAL");
        assert!(json.get("type").is_none());
        assert!(json.get("annotated_image").is_none());

        let threat = &json["threats"][0];
        assert_eq!(threat["id"], 1);
        assert_eq!(threat["class"], "Submarine");
        assert_eq!(threat["class_id"], 1);
        assert_eq!(threat["threat_level"], "CRITICAL");
        assert_eq!(threat["bounding_box"]["width"], 40.0);
        assert_eq!(threat["bounding_box"]["center_y"], 30.0);
        assert_eq!(threat["area_pixels"], 800.0);
        assert!((threat["relative_size"].as_f64().unwrap() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn threat_ids_are_one_based_in_order() {
        let frame = FrameAssessment::assess(vec![
            Detection::new(3, "divers", 0.6, BoundingBox::new(0.0, 0.0, 5.0, 5.0)),
            Detection::new(4, "mayin", 0.4, BoundingBox::new(5.0, 5.0, 9.0, 9.0)),
        ]);
        let ids: Vec<usize> = threat_entries(&frame, 10, 10).iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn video_report_summarizes_kept_frames() {
        let meta = VideoMetadata {
            fps: 30.0,
            total_frames: 90,
            width: 64,
            height: 48,
        };
        let mut agg = VideoAggregator::new(meta, 30).unwrap();
        agg.record(
            30,
            Ok(FrameAssessment::assess(vec![
                Detection::new(1, "Submarine", 0.9, BoundingBox::new(0.0, 0.0, 8.0, 8.0)),
                Detection::new(3, "divers", 0.6, BoundingBox::new(8.0, 8.0, 16.0, 16.0)),
            ])),
        );
        agg.record(0, Ok(FrameAssessment::empty()));
        agg.record(60, Err(ThreatError::detection("boom")));

        let report = VideoReport::from_assessment(&agg.finish(None));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["type"], "video");
        assert_eq!(json["video_metadata"]["duration_seconds"], 3.0);
        assert_eq!(json["video_metadata"]["resolution"], "64x48");
        assert_eq!(json["total_detections"], 1);
        assert_eq!(json["total_threats"], 2);
        assert_eq!(json["frames_with_threats"][0]["frame_number"], 30);
        assert_eq!(json["frames_with_threats"][0]["timestamp"], 1.0);
        assert_eq!(json["summary"]["frames_analyzed"], 3);
        assert_eq!(json["summary"]["detection_rate"], 33.33);
        assert_eq!(json["summary"]["frames_failed"], 1);
        assert_eq!(json["summary"]["truncated"], false);
        assert!(json["summary"].get("truncated_reason").is_none());
    }

    #[test]
    fn failure_report_carries_error_text() {
        let report = FailureReport::from(&ThreatError::detection("model missing"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "Detection error: model missing");
    }
}
