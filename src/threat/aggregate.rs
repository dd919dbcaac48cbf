use crate::detect::Detection;

use super::classify::{classify_all, ClassifiedDetection};
use super::level::ThreatLevel;

/// Weight of the most severe per-detection level; the normalization ceiling.
const MAX_WEIGHT: f64 = 4.0;

/// Score thresholds, checked most severe first. Below the last one is MINIMAL.
const SCORE_THRESHOLDS: &[(f64, ThreatLevel)] = &[
    (0.8, ThreatLevel::Critical),
    (0.6, ThreatLevel::High),
    (0.4, ThreatLevel::Medium),
    (0.2, ThreatLevel::Low),
];

/// Verdict for one analyzed image or video frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameAssessment {
    pub detections: Vec<ClassifiedDetection>,
    pub overall_level: ThreatLevel,
    /// Normalized score in `[0, 1]`, rounded to 3 decimals.
    pub overall_score: f64,
}

impl FrameAssessment {
    /// Classify raw detections and fold them into a single verdict.
    pub fn assess(detections: Vec<Detection>) -> Self {
        Self::from_classified(classify_all(detections))
    }

    pub fn from_classified(detections: Vec<ClassifiedDetection>) -> Self {
        let (overall_level, overall_score) = aggregate(&detections);
        Self {
            detections,
            overall_level,
            overall_score,
        }
    }

    pub fn empty() -> Self {
        Self::from_classified(Vec::new())
    }

    pub fn threat_count(&self) -> usize {
        self.detections.len()
    }

    pub fn has_detections(&self) -> bool {
        !self.detections.is_empty()
    }
}

/// Combine per-detection levels and confidences into one `(level, score)`.
///
/// The score is `Σ confidence × weight(level) / (n × 4)`, rounded to three
/// decimals before it is bucketed so the level always matches the reported score.
pub fn aggregate(detections: &[ClassifiedDetection]) -> (ThreatLevel, f64) {
    if detections.is_empty() {
        return (ThreatLevel::None, 0.0);
    }

    let raw_score: f64 = detections
        .iter()
        .map(|d| d.confidence() as f64 * d.level.weight())
        .sum();
    let max_possible = detections.len() as f64 * MAX_WEIGHT;
    let score = round_to(raw_score / max_possible, 3);

    (level_for_score(score), score)
}

pub fn level_for_score(score: f64) -> ThreatLevel {
    SCORE_THRESHOLDS
        .iter()
        .find(|(threshold, _)| score >= *threshold)
        .map(|(_, level)| *level)
        .unwrap_or(ThreatLevel::Minimal)
}

/// Round half away from zero to `decimals` digits.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
