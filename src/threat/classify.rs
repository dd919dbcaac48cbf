use crate::detect::Detection;

use super::level::ThreatLevel;

/// Priority assigned to classes missing from [`CLASS_PRIORITIES`].
pub const DEFAULT_PRIORITY: u8 = 2;

/// Hazard priority per model class (1 = lowest, 4 = highest).
///
/// Names are matched ASCII case-insensitively. The mine entries cover the
/// dataset export label as well as the Turkish "mayin".
pub const CLASS_PRIORITIES: &[(&str, u8)] = &[
    ("Mines - v1 2025-05-15 8-03pm", 4),
    ("mine", 4),
    ("mines", 4),
    ("mayin", 4),
    ("Submarine", 3),
    ("auv-rov", 2),
    ("divers", 1),
];

/// A detection with its assigned threat level. Never mutated after creation.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassifiedDetection {
    pub detection: Detection,
    pub level: ThreatLevel,
}

impl ClassifiedDetection {
    pub fn new(detection: Detection) -> Self {
        let level = classify(detection.confidence, &detection.class_name);
        Self { detection, level }
    }

    pub fn confidence(&self) -> f32 {
        self.detection.confidence
    }
}

pub fn class_priority(class_name: &str) -> u8 {
    CLASS_PRIORITIES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(class_name))
        .map(|(_, priority)| *priority)
        .unwrap_or(DEFAULT_PRIORITY)
}

/// Assign a per-detection threat level. Total: out-of-range confidences and
/// unknown classes fall through to the defaults, never to an error.
pub fn classify(confidence: f32, class_name: &str) -> ThreatLevel {
    let priority = class_priority(class_name);
    if confidence >= 0.8 && priority >= 3 {
        ThreatLevel::Critical
    } else if confidence >= 0.7 && priority >= 2 {
        ThreatLevel::High
    } else if confidence >= 0.5 && priority >= 1 {
        ThreatLevel::Medium
    } else {
        ThreatLevel::Low
    }
}

pub fn classify_all(detections: Vec<Detection>) -> Vec<ClassifiedDetection> {
    detections.into_iter().map(ClassifiedDetection::new).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_table_with_default() {
        assert_eq!(class_priority("divers"), 1);
        assert_eq!(class_priority("auv-rov"), 2);
        assert_eq!(class_priority("Submarine"), 3);
        assert_eq!(class_priority("submarine"), 3);
        assert_eq!(class_priority("Mines - v1 2025-05-15 8-03pm"), 4);
        assert_eq!(class_priority("mayin"), 4);
        assert_eq!(class_priority("jellyfish"), DEFAULT_PRIORITY);
    }

    #[test]
    fn submarine_at_085_is_critical() {
        assert_eq!(classify(0.85, "Submarine"), ThreatLevel::Critical);
    }

    #[test]
    fn mine_reaches_critical_at_threshold() {
        assert_eq!(classify(0.8, "mayin"), ThreatLevel::Critical);
        assert_eq!(classify(0.79, "mayin"), ThreatLevel::High);
    }

    #[test]
    fn divers_never_exceed_medium() {
        assert_eq!(classify(0.99, "divers"), ThreatLevel::Medium);
        assert_eq!(classify(0.55, "divers"), ThreatLevel::Medium);
        assert_eq!(classify(0.3, "divers"), ThreatLevel::Low);
    }

    #[test]
    fn unknown_class_uses_default_priority() {
        assert_eq!(classify(0.95, "buoy"), ThreatLevel::High);
        assert_eq!(classify(0.6, "buoy"), ThreatLevel::Medium);
        assert_eq!(classify(0.1, "buoy"), ThreatLevel::Low);
    }

    #[test]
    fn out_of_range_confidence_is_tolerated() {
        assert_eq!(classify(1.7, "Submarine"), ThreatLevel::Critical);
        assert_eq!(classify(-0.4, "Submarine"), ThreatLevel::Low);
        assert_eq!(classify(f32::NAN, "Submarine"), ThreatLevel::Low);
    }

    #[test]
    fn classify_is_deterministic() {
        for step in 0..=20 {
            let confidence = step as f32 / 20.0;
            for (name, _) in CLASS_PRIORITIES {
                assert_eq!(classify(confidence, name), classify(confidence, name));
            }
        }
    }
}
