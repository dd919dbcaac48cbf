use serde::{Deserialize, Serialize};

/// Ordinal threat severity.
///
/// Variants are declared in ascending severity, so the derived `Ord` is the
/// severity order `NONE < MINIMAL < LOW < MEDIUM < HIGH < CRITICAL`.
/// `None` and `Minimal` only appear as aggregate verdicts; a single detection
/// is always one of `Low..=Critical`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThreatLevel {
    None,
    Minimal,
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Weight applied to a detection's confidence when aggregating.
    pub fn weight(self) -> f64 {
        match self {
            ThreatLevel::Critical => 4.0,
            ThreatLevel::High => 3.0,
            ThreatLevel::Medium => 2.0,
            ThreatLevel::Low | ThreatLevel::Minimal | ThreatLevel::None => 1.0,
        }
    }

    /// Box/tag color used by the annotated renderer (RGB).
    pub fn color(self) -> [u8; 3] {
        match self {
            ThreatLevel::Critical => [255, 0, 0],
            ThreatLevel::High => [255, 165, 0],
            ThreatLevel::Medium => [255, 255, 0],
            ThreatLevel::Low => [0, 255, 0],
            ThreatLevel::Minimal | ThreatLevel::None => [255, 255, 255],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreatLevel::None => "NONE",
            ThreatLevel::Minimal => "MINIMAL",
            ThreatLevel::Low => "LOW",
            ThreatLevel::Medium => "MEDIUM",
            ThreatLevel::High => "HIGH",
            ThreatLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most severe level in `levels`, or `None` when the iterator is empty.
pub fn max_severity(levels: impl IntoIterator<Item = ThreatLevel>) -> ThreatLevel {
    levels.into_iter().max().unwrap_or(ThreatLevel::None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_ascending() {
        assert!(ThreatLevel::None < ThreatLevel::Minimal);
        assert!(ThreatLevel::Minimal < ThreatLevel::Low);
        assert!(ThreatLevel::Low < ThreatLevel::Medium);
        assert!(ThreatLevel::Medium < ThreatLevel::High);
        assert!(ThreatLevel::High < ThreatLevel::Critical);
    }

    #[test]
    fn max_severity_of_nothing_is_none() {
        assert_eq!(max_severity(Vec::new()), ThreatLevel::None);
    }

    #[test]
    fn max_severity_picks_worst() {
        let levels = [ThreatLevel::Minimal, ThreatLevel::High, ThreatLevel::Low];
        assert_eq!(max_severity(levels), ThreatLevel::High);
    }

    #[test]
    fn serializes_as_uppercase_name() {
        let json = serde_json::to_string(&ThreatLevel::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
        let level: ThreatLevel = serde_json::from_str("\"MINIMAL\"").unwrap();
        assert_eq!(level, ThreatLevel::Minimal);
    }
}
