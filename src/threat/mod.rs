//! Threat assessment: per-detection classification and per-frame aggregation.

mod aggregate;
mod classify;
mod level;

pub use aggregate::{aggregate, level_for_score, round_to, FrameAssessment};
pub use classify::{
    class_priority, classify, classify_all, ClassifiedDetection, CLASS_PRIORITIES,
    DEFAULT_PRIORITY,
};
pub use level::{max_severity, ThreatLevel};
