//! Frame and image ingestion.
//!
//! This module provides the sources the analyzer reads from:
//! - Still images decoded from local files (`still`)
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` videos (testing)
//!
//! Video sources are strictly sequential. `next_frame` returns `Ok(None)` on
//! normal exhaustion and `Err` when decoding fails part-way through, so the
//! sampler can report a truncated source instead of silently stopping.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod still;

use anyhow::Result;

use crate::frame::RawFrame;

pub use still::{fit_within, load_image, LoadedImage};
pub use file::{FileConfig, FileSource, FileStats};

/// Stream properties reported by a video source when it is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VideoMetadata {
    /// Frames per second; `0.0` when the container does not say.
    pub fps: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// `total_frames / fps`, or 0 for a source without a usable frame rate.
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Presentation time of a frame index, 0 when fps is unknown.
    pub fn timestamp_of(&self, frame_index: u64) -> f64 {
        if self.fps > 0.0 {
            frame_index as f64 / self.fps
        } else {
            0.0
        }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Sequential source of decoded frames.
pub trait FrameSource {
    fn metadata(&self) -> VideoMetadata;

    /// Next frame in decode order, `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_fps_has_zero_duration_and_timestamps() {
        let meta = VideoMetadata {
            fps: 0.0,
            total_frames: 120,
            width: 640,
            height: 480,
        };
        assert_eq!(meta.duration_seconds(), 0.0);
        assert_eq!(meta.timestamp_of(60), 0.0);
        assert_eq!(meta.resolution(), "640x480");
    }

    #[test]
    fn timestamps_follow_frame_rate() {
        let meta = VideoMetadata {
            fps: 30.0,
            total_frames: 90,
            width: 64,
            height: 48,
        };
        assert_eq!(meta.duration_seconds(), 3.0);
        assert_eq!(meta.timestamp_of(30), 1.0);
    }
}
