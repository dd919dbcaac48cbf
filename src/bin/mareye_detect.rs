//! mareye_detect - Analyze image and video files from the command line.
//!
//! Prints a threat summary per file. With `--out`, also writes the JSON report
//! and, for images with threats, the annotated overlay.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use mareye::api::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS};
use mareye::render;
use mareye::{MarEyeConfig, ThreatAnalyzer, ThreatEntry};

#[derive(Parser, Debug)]
#[command(
    name = "mareye_detect",
    about = "Detect marine hazards in image and video files"
)]
struct Args {
    /// Image or video files (stub://name?frames=N selects a synthetic clip)
    #[arg(required = true, value_name = "PATH")]
    paths: Vec<String>,

    /// Write threat_detection_result_<ts>.json (and annotated JPEGs) here
    #[arg(long, value_name = "DIR")]
    out: Option<PathBuf>,

    /// Analyze every Nth video frame
    #[arg(long, value_name = "N")]
    frame_interval: Option<u32>,

    /// Minimum detection confidence (0..1)
    #[arg(long, value_name = "CONF")]
    threshold: Option<f32>,

    /// Detector backend (tract|stub)
    #[arg(long, value_name = "NAME")]
    backend: Option<String>,

    /// ONNX model path
    #[arg(long, value_name = "PATH")]
    model: Option<PathBuf>,

    /// TTF/OTF font for overlay labels
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,

    /// Print the full JSON report instead of the summary
    #[arg(long)]
    json: bool,
}

enum MediaKind {
    Image,
    Video,
}

fn media_kind(path: &str) -> Option<MediaKind> {
    if path.starts_with("stub://") {
        return Some(MediaKind::Video);
    }
    let ext = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())?;
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = MarEyeConfig::load()?;
    if let Some(threshold) = args.threshold {
        config.model.confidence_threshold = threshold;
    }
    if let Some(backend) = &args.backend {
        config.model.backend = backend.clone();
    }
    if let Some(model) = &args.model {
        config.model.path = model.clone();
    }
    if let Some(font) = &args.font {
        config.image.font_path = Some(font.clone());
    }
    if let Some(interval) = args.frame_interval {
        config.video.frame_interval = interval;
    }
    config.validate()?;

    if let Some(dir) = &args.out {
        std::fs::create_dir_all(dir)?;
    }
    let analyzer = ThreatAnalyzer::from_config(&config)?;
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();

    let mut failures = 0usize;
    for (i, path) in args.paths.iter().enumerate() {
        let suffix = if args.paths.len() > 1 {
            format!("{}_{}", stamp, i + 1)
        } else {
            stamp.clone()
        };
        if !args.json {
            println!("mareye_detect: {}", path);
        }
        let ok = match media_kind(path) {
            Some(MediaKind::Image) => run_image(&analyzer, &args, path, &suffix)?,
            Some(MediaKind::Video) => run_video(&analyzer, &args, path, &suffix)?,
            None => {
                eprintln!("  unsupported file type: {}", path);
                false
            }
        };
        if !ok {
            failures += 1;
        }
    }

    if failures > 0 {
        return Err(anyhow!("{} of {} files failed", failures, args.paths.len()));
    }
    Ok(())
}

fn run_image(analyzer: &ThreatAnalyzer, args: &Args, path: &str, suffix: &str) -> Result<bool> {
    let analysis = match analyzer.analyze_image(Path::new(path)) {
        Ok(analysis) => analysis,
        Err(err) => {
            eprintln!("  detection failed: {}", err);
            return Ok(false);
        }
    };
    let report = &analysis.report;
    if args.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("  threats found: {}", report.threat_count);
        println!("  overall threat level: {}", report.overall_threat_level);
        println!("  threat score: {}", report.overall_threat_score);
        print_threats(&report.threats);
    }

    if let Some(dir) = &args.out {
        let json_path = dir.join(format!("threat_detection_result_{}.json", suffix));
        std::fs::write(&json_path, serde_json::to_vec_pretty(report)?)?;
        if let Some(annotated) = analyzer.annotate(&analysis) {
            let image_path = dir.join(format!("threat_detection_annotated_{}.jpg", suffix));
            render::write(&annotated, &image_path)?;
            log::info!("annotated image written to {}", image_path.display());
        }
        log::info!("report written to {}", json_path.display());
    }
    Ok(true)
}

fn run_video(analyzer: &ThreatAnalyzer, args: &Args, path: &str, suffix: &str) -> Result<bool> {
    let report = match analyzer.analyze_video(Path::new(path), args.frame_interval) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("  video processing failed: {}", err);
            return Ok(false);
        }
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let meta = &report.video_metadata;
        println!(
            "  {} frames @ {:.2} fps ({}s, {}), every {} frame(s)",
            meta.total_frames, meta.fps, meta.duration_seconds, meta.resolution, meta.frame_interval
        );
        println!(
            "  frames analyzed: {}, with threats: {} ({}%)",
            report.summary.frames_analyzed,
            report.summary.frames_with_detections,
            report.summary.detection_rate
        );
        println!("  overall threat level: {}", report.overall_threat_level);
        if report.summary.frames_failed > 0 {
            println!("  frames with detector errors: {}", report.summary.frames_failed);
        }
        if let Some(reason) = &report.summary.truncated_reason {
            println!("  WARNING: video truncated: {}", reason);
        }
        for frame in &report.frames_with_threats {
            println!(
                "  frame {} @ {:.2}s: {} threat(s), {}",
                frame.frame_number, frame.timestamp, frame.threat_count, frame.threat_level
            );
        }
    }

    if let Some(dir) = &args.out {
        let json_path = dir.join(format!("threat_detection_result_{}.json", suffix));
        std::fs::write(&json_path, serde_json::to_vec_pretty(&report)?)?;
        log::info!("report written to {}", json_path.display());
    }
    Ok(true)
}

fn print_threats(threats: &[ThreatEntry]) {
    for threat in threats {
        println!("    - {} - {} threat", threat.class_name, threat.threat_level);
        println!("      confidence: {:.1}%", threat.confidence_percentage);
        println!("      size: {:.1}% of image", threat.relative_size);
    }
}
