//! Frame sampling and video-level aggregation.
//!
//! The sampler walks a [`FrameSource`] sequentially. Only frames whose 0-based
//! index is a multiple of `frame_interval` are sent to the detector; the rest
//! are decoded and dropped without further work. Each sampled frame produces a
//! tagged outcome (`Ok(FrameAssessment)` or the detection failure) which the
//! [`VideoAggregator`] folds into the final [`VideoAssessment`].

use anyhow::Result;
use image::RgbImage;

use crate::detect::Detection;
use crate::error::{ThreatError, ThreatResult};
use crate::ingest::{FrameSource, VideoMetadata};
use crate::threat::{max_severity, round_to, FrameAssessment, ThreatLevel};

pub const DEFAULT_FRAME_INTERVAL: u32 = 30;

/// Result of running detection on one sampled frame.
pub type FrameOutcome = Result<FrameAssessment, ThreatError>;

/// A sampled frame with at least one detection.
#[derive(Clone, Debug, PartialEq)]
pub struct KeptFrame {
    pub frame_index: u64,
    /// Seconds from the start of the video; 0 when fps is unknown.
    pub timestamp: f64,
    pub assessment: FrameAssessment,
}

/// Video-level verdict plus sampling statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoAssessment {
    pub metadata: VideoMetadata,
    pub frame_interval: u32,
    /// Kept frames in ascending `frame_index` order.
    pub frame_results: Vec<KeptFrame>,
    pub overall_level: ThreatLevel,
    /// Sampled frames, including ones without detections or with failures.
    pub processed_frames: u64,
    /// Sampled frames whose detector call failed (counted as zero detections).
    pub frames_failed: u64,
    /// Set when the source failed after it started yielding frames.
    pub truncated: Option<ThreatError>,
}

impl VideoAssessment {
    pub fn frames_with_detections(&self) -> u64 {
        self.frame_results.len() as u64
    }

    /// Number of kept frames; the report's `total_detections`.
    pub fn total_detections(&self) -> u64 {
        self.frames_with_detections()
    }

    /// Σ threat count over kept frames.
    pub fn total_threat_count(&self) -> u64 {
        self.frame_results
            .iter()
            .map(|f| f.assessment.threat_count() as u64)
            .sum()
    }

    /// Percentage of sampled frames with detections, 2 decimals, 0 when nothing was sampled.
    pub fn detection_rate(&self) -> f64 {
        if self.processed_frames == 0 {
            return 0.0;
        }
        round_to(
            self.frames_with_detections() as f64 / self.processed_frames as f64 * 100.0,
            2,
        )
    }

    pub fn duration_seconds(&self) -> f64 {
        round_to(self.metadata.duration_seconds(), 2)
    }
}

/// Incremental fold of sampled-frame outcomes.
pub struct VideoAggregator {
    metadata: VideoMetadata,
    frame_interval: u32,
    kept: Vec<KeptFrame>,
    processed_frames: u64,
    frames_failed: u64,
}

impl VideoAggregator {
    pub fn new(metadata: VideoMetadata, frame_interval: u32) -> ThreatResult<Self> {
        validate_frame_interval(frame_interval)?;
        Ok(Self {
            metadata,
            frame_interval,
            kept: Vec::new(),
            processed_frames: 0,
            frames_failed: 0,
        })
    }

    pub fn should_sample(&self, frame_index: u64) -> bool {
        frame_index % self.frame_interval as u64 == 0
    }

    /// Fold one sampled frame. Failures and empty frames are counted but not kept.
    pub fn record(&mut self, frame_index: u64, outcome: FrameOutcome) {
        self.processed_frames += 1;
        match outcome {
            Ok(assessment) if assessment.has_detections() => {
                self.kept.push(KeptFrame {
                    frame_index,
                    timestamp: self.metadata.timestamp_of(frame_index),
                    assessment,
                });
            }
            Ok(_) => {}
            Err(err) => {
                self.frames_failed += 1;
                log::warn!("frame {} contributes no detections: {}", frame_index, err);
            }
        }
    }

    pub fn finish(mut self, truncated: Option<ThreatError>) -> VideoAssessment {
        self.kept.sort_by_key(|f| f.frame_index);
        let overall_level = max_severity(self.kept.iter().map(|f| f.assessment.overall_level));
        VideoAssessment {
            metadata: self.metadata,
            frame_interval: self.frame_interval,
            frame_results: self.kept,
            overall_level,
            processed_frames: self.processed_frames,
            frames_failed: self.frames_failed,
            truncated,
        }
    }
}

pub fn validate_frame_interval(frame_interval: u32) -> ThreatResult<()> {
    if frame_interval == 0 {
        return Err(ThreatError::Configuration(
            "frame_interval must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Drive `source` to exhaustion, running `detect` on every sampled frame.
///
/// Each frame is dropped before the next one is read. A source error after
/// the first frame ends sampling early and is reported in
/// [`VideoAssessment::truncated`]; it does not fail the whole video.
pub fn sample_video<S, F>(source: &mut S, frame_interval: u32, mut detect: F) -> ThreatResult<VideoAssessment>
where
    S: FrameSource + ?Sized,
    F: FnMut(&RgbImage) -> Result<Vec<Detection>>,
{
    let metadata = source.metadata();
    let mut aggregator = VideoAggregator::new(metadata, frame_interval)?;
    let mut next_index = 0u64;

    let truncated = loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break None,
            Err(err) if next_index == 0 => {
                return Err(ThreatError::SourceUnavailable(format!(
                    "Failed to read video: {:#}",
                    err
                )));
            }
            Err(err) => {
                let reason = format!("{:#}", err);
                log::warn!("video source stopped after {} frames: {}", next_index, reason);
                break Some(ThreatError::TruncatedSource {
                    frame_index: next_index - 1,
                    reason,
                });
            }
        };
        let frame_index = next_index;
        next_index += 1;

        if !aggregator.should_sample(frame_index) {
            continue;
        }
        let outcome = detect(frame.image())
            .map(FrameAssessment::assess)
            .map_err(ThreatError::detection);
        aggregator.record(frame_index, outcome);
    };

    let assessment = aggregator.finish(truncated);
    log::info!(
        "video sampled: {} frames read, {} analyzed, {} with threats, overall {}",
        next_index,
        assessment.processed_frames,
        assessment.frames_with_detections(),
        assessment.overall_level
    );
    Ok(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;
    use crate::ingest::{FileConfig, FileSource};
    use anyhow::anyhow;

    fn submarine(confidence: f32) -> Detection {
        Detection::new(1, "Submarine", confidence, BoundingBox::new(4.0, 4.0, 20.0, 16.0))
    }

    fn open(path: &str) -> FileSource {
        FileSource::open(FileConfig::new(path)).unwrap()
    }

    #[test]
    fn samples_every_interval_and_keeps_frames_with_detections() {
        let mut source = open("stub://clip?frames=90&fps=30");
        let mut seen = Vec::new();
        let video = sample_video(&mut source, 30, |_| {
            let n = seen.len();
            seen.push(n);
            Ok(if n == 1 { vec![submarine(0.85)] } else { vec![] })
        })
        .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(video.processed_frames, 3);
        assert_eq!(video.frames_with_detections(), 1);
        assert_eq!(video.detection_rate(), 33.33);
        assert_eq!(video.frame_results[0].frame_index, 30);
        assert_eq!(video.frame_results[0].timestamp, 1.0);
        assert_eq!(video.overall_level, ThreatLevel::Critical);
        assert_eq!(video.total_threat_count(), 1);
        assert_eq!(video.duration_seconds(), 3.0);
    }

    #[test]
    fn identical_detections_give_identical_frames() {
        let mut source = open("stub://clip?frames=4&fps=2");
        let video = sample_video(&mut source, 1, |_| Ok(vec![submarine(0.9), submarine(0.4)])).unwrap();

        assert_eq!(video.frame_results.len(), 4);
        let first = &video.frame_results[0];
        for (k, frame) in video.frame_results.iter().enumerate() {
            assert_eq!(frame.frame_index, k as u64);
            assert_eq!(frame.timestamp, k as f64 / 2.0);
            assert_eq!(frame.assessment, first.assessment);
        }
        assert_eq!(video.detection_rate(), 100.0);
    }

    #[test]
    fn empty_video_is_none_with_zero_rate() {
        let mut source = open("stub://clip?frames=0");
        let video = sample_video(&mut source, 30, |_| Ok(vec![submarine(0.9)])).unwrap();
        assert_eq!(video.processed_frames, 0);
        assert_eq!(video.detection_rate(), 0.0);
        assert_eq!(video.overall_level, ThreatLevel::None);
        assert!(video.frame_results.is_empty());
    }

    #[test]
    fn zero_fps_gives_zero_timestamps_and_duration() {
        let mut source = open("stub://clip?frames=3&fps=0");
        let video = sample_video(&mut source, 1, |_| Ok(vec![submarine(0.9)])).unwrap();
        assert!(video.frame_results.iter().all(|f| f.timestamp == 0.0));
        assert_eq!(video.duration_seconds(), 0.0);
    }

    #[test]
    fn zero_interval_is_rejected_before_sampling() {
        let mut source = open("stub://clip?frames=3");
        let mut calls = 0;
        let err = sample_video(&mut source, 0, |_| {
            calls += 1;
            Ok(vec![])
        })
        .err()
        .unwrap();
        assert!(matches!(err, ThreatError::Configuration(_)));
        assert_eq!(calls, 0);
    }

    #[test]
    fn detector_failures_count_as_empty_frames() {
        let mut source = open("stub://clip?frames=3");
        let mut n = 0;
        let video = sample_video(&mut source, 1, |_| {
            n += 1;
            match n {
                2 => Err(anyhow!("inference timed out")),
                _ => Ok(vec![submarine(0.75)]),
            }
        })
        .unwrap();
        assert_eq!(video.processed_frames, 3);
        assert_eq!(video.frames_failed, 1);
        assert_eq!(video.frames_with_detections(), 2);
        assert_eq!(video.detection_rate(), 66.67);
        let kept: Vec<u64> = video.frame_results.iter().map(|f| f.frame_index).collect();
        assert_eq!(kept, vec![0, 2]);
    }

    #[test]
    fn mid_stream_failure_truncates_but_succeeds() {
        let mut source = open("stub://clip?frames=10&fail_after=4");
        let video = sample_video(&mut source, 2, |_| Ok(vec![submarine(0.9)])).unwrap();
        assert_eq!(video.processed_frames, 2);
        match video.truncated {
            Some(ThreatError::TruncatedSource { frame_index, .. }) => assert_eq!(frame_index, 3),
            other => panic!("expected truncation, got {:?}", other),
        }
    }

    #[test]
    fn failure_before_first_frame_is_source_unavailable() {
        let mut source = open("stub://clip?frames=10&fail_after=0");
        let err = sample_video(&mut source, 1, |_| Ok(vec![])).err().unwrap();
        assert!(matches!(err, ThreatError::SourceUnavailable(_)));
    }

    #[test]
    fn video_level_is_max_severity_including_minimal() {
        let meta = VideoMetadata {
            fps: 10.0,
            total_frames: 20,
            width: 8,
            height: 8,
        };
        let weak = Detection::new(3, "divers", 0.3, BoundingBox::new(0.0, 0.0, 1.0, 1.0));

        let mut agg = VideoAggregator::new(meta, 10).unwrap();
        agg.record(0, Ok(FrameAssessment::assess(vec![weak.clone()])));
        agg.record(10, Ok(FrameAssessment::empty()));
        let video = agg.finish(None);
        assert_eq!(video.overall_level, ThreatLevel::Minimal);

        let mut agg = VideoAggregator::new(meta, 10).unwrap();
        agg.record(10, Ok(FrameAssessment::assess(vec![submarine(0.75)])));
        agg.record(0, Ok(FrameAssessment::assess(vec![weak])));
        let video = agg.finish(None);
        assert_eq!(video.overall_level, ThreatLevel::Medium);
        assert_eq!(video.frame_results[0].frame_index, 0);
    }
}
