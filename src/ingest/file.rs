//! Local file frame source.
//!
//! `FileSource` reads frames from a local video file. Paths of the form
//! `stub://name?frames=90&fps=30` select a synthetic clip generated in memory,
//! which keeps the sampling pipeline testable without a video decoder.
//!
//! The file source MUST NOT:
//! - Fetch remote URLs
//! - Write decoded frames to disk
//! - Hold more than the frame currently being handed out

use anyhow::{anyhow, Result};

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, VideoMetadata};
use crate::frame::RawFrame;

const SYNTHETIC_DEFAULT_FRAMES: u64 = 90;
const SYNTHETIC_DEFAULT_FPS: f64 = 30.0;
const SYNTHETIC_DEFAULT_WIDTH: u32 = 64;
const SYNTHETIC_DEFAULT_HEIGHT: u32 = 48;

/// Configuration for a local file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "/tmp/upload.mp4") or a `stub://` clip.
    pub path: String,
}

impl FileConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Local file frame source.
pub struct FileSource {
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    /// Open the source. Fails when the file cannot be opened or has no video track.
    pub fn open(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            Ok(Self {
                backend: FileBackend::Synthetic(SyntheticFileSource::new(config)?),
            })
        } else {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Self {
                    backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
                })
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "video decoding requires the ingest-file-ffmpeg feature"
                ))
            }
        }
    }

    /// Get frame statistics.
    pub fn stats(&self) -> FileStats {
        match &self.backend {
            FileBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

impl FrameSource for FileSource {
    fn metadata(&self) -> VideoMetadata {
        match &self.backend {
            FileBackend::Synthetic(source) => source.metadata,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.metadata(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }
}

/// Statistics for a file source.
#[derive(Clone, Debug)]
pub struct FileStats {
    pub frames_decoded: u64,
    pub path: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

/// Query parameters: `frames`, `fps`, `width`, `height`, and `fail_after`
/// (decode error once that many frames were produced).
struct SyntheticFileSource {
    config: FileConfig,
    metadata: VideoMetadata,
    fail_after: Option<u64>,
    frame_count: u64,
    frame_bytes: usize,
}

impl SyntheticFileSource {
    fn new(config: FileConfig) -> Result<Self> {
        let mut metadata = VideoMetadata {
            fps: SYNTHETIC_DEFAULT_FPS,
            total_frames: SYNTHETIC_DEFAULT_FRAMES,
            width: SYNTHETIC_DEFAULT_WIDTH,
            height: SYNTHETIC_DEFAULT_HEIGHT,
        };
        let mut fail_after = None;

        if let Some(query) = config.path.split_once('?').map(|(_, q)| q) {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
                let bad = || anyhow!("invalid stub parameter {}={}", key, value);
                match key {
                    "frames" => metadata.total_frames = value.parse().map_err(|_| bad())?,
                    "fps" => metadata.fps = value.parse().map_err(|_| bad())?,
                    "width" => metadata.width = value.parse().map_err(|_| bad())?,
                    "height" => metadata.height = value.parse().map_err(|_| bad())?,
                    "fail_after" => fail_after = Some(value.parse().map_err(|_| bad())?),
                    _ => return Err(anyhow!("unknown stub parameter '{}'", key)),
                }
            }
        }
        if metadata.width == 0 || metadata.height == 0 {
            return Err(anyhow!("stub video must have a non-empty resolution"));
        }
        let frame_bytes = (metadata.width as usize)
            .checked_mul(metadata.height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("stub video resolution {} is too large", metadata.resolution()))?;

        log::info!("FileSource: opened {} (synthetic)", config.path);
        Ok(Self {
            config,
            metadata,
            fail_after,
            frame_count: 0,
            frame_bytes,
        })
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if self.fail_after == Some(self.frame_count) {
            return Err(anyhow!(
                "synthetic decode error after {} frames",
                self.frame_count
            ));
        }
        if self.frame_count >= self.metadata.total_frames {
            return Ok(None);
        }

        let pixels = self.generate_synthetic_pixels();
        let frame = RawFrame::from_rgb(
            self.frame_count,
            self.metadata.width,
            self.metadata.height,
            pixels,
        )?;
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn generate_synthetic_pixels(&self) -> Vec<u8> {
        let mut pixels = vec![0u8; self.frame_bytes];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count) % 256) as u8;
        }
        pixels
    }

    fn stats(&self) -> FileStats {
        FileStats {
            frames_decoded: self.frame_count,
            path: self.config.path.clone(),
        }
    }
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_remote_urls() {
        let err = FileSource::open(FileConfig::new("rtsp://camera/stream")).err().unwrap();
        assert!(err.to_string().contains("local paths"));
        assert!(FileSource::open(FileConfig::new("  ")).is_err());
    }

    #[test]
    fn synthetic_clip_yields_declared_frames() -> Result<()> {
        let mut source = FileSource::open(FileConfig::new("stub://clip?frames=5&fps=10&width=8&height=6"))?;
        let meta = source.metadata();
        assert_eq!(meta.fps, 10.0);
        assert_eq!(meta.total_frames, 5);
        assert_eq!(meta.resolution(), "8x6");

        let mut indices = Vec::new();
        while let Some(frame) = source.next_frame()? {
            assert_eq!((frame.width(), frame.height()), (8, 6));
            indices.push(frame.index());
        }
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(source.stats().frames_decoded, 5);
        Ok(())
    }

    #[test]
    fn synthetic_clip_can_fail_mid_stream() -> Result<()> {
        let mut source = FileSource::open(FileConfig::new("stub://clip?frames=10&fail_after=2"))?;
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame()?.is_some());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn large_stub_dimensions_do_not_overflow() -> Result<()> {
        let mut source = FileSource::open(FileConfig::new("stub://wide?frames=1&width=70000&height=1"))?;
        let frame = source.next_frame()?.unwrap();
        assert_eq!((frame.width(), frame.height()), (70000, 1));

        let err = FileSource::open(FileConfig::new(
            "stub://huge?width=4294967295&height=4294967295",
        ))
        .err()
        .unwrap();
        assert!(err.to_string().contains("too large"));
        Ok(())
    }

    #[test]
    fn unknown_stub_parameter_is_rejected() {
        assert!(FileSource::open(FileConfig::new("stub://clip?colour=blue")).is_err());
        assert!(FileSource::open(FileConfig::new("stub://clip?fps=fast")).is_err());
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn real_files_need_the_decoder_feature() {
        let err = FileSource::open(FileConfig::new("/tmp/upload.mp4")).err().unwrap();
        assert!(err.to_string().contains("ingest-file-ffmpeg"));
    }
}
