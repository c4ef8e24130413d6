use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Earthquake alert level, ordered by severity (green < yellow < orange < red)
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AlertLevel {
    Green,
    Yellow,
    Orange,
    Red,
}

impl AlertLevel {
    /// All levels in ascending severity
    pub const ALL: [AlertLevel; 4] = [
        AlertLevel::Green,
        AlertLevel::Yellow,
        AlertLevel::Orange,
        AlertLevel::Red,
    ];

    /// Canonical lowercase label, as stored in datasets and the label encoder
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Green => "green",
            AlertLevel::Yellow => "yellow",
            AlertLevel::Orange => "orange",
            AlertLevel::Red => "red",
        }
    }

    /// Short guidance shown next to the level
    pub fn description(&self) -> &'static str {
        match self {
            AlertLevel::Green => "Low risk, safe conditions",
            AlertLevel::Yellow => "Moderate risk, stay alert",
            AlertLevel::Orange => "High risk, be prepared",
            AlertLevel::Red => "Severe risk, immediate action",
        }
    }

    /// Orange and red events count as high risk
    pub fn is_high_risk(&self) -> bool {
        matches!(self, AlertLevel::Orange | AlertLevel::Red)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertLevel::Green < AlertLevel::Yellow);
        assert!(AlertLevel::Yellow < AlertLevel::Orange);
        assert!(AlertLevel::Orange < AlertLevel::Red);
        assert_eq!(AlertLevel::ALL.iter().max(), Some(&AlertLevel::Red));
    }

    #[test]
    fn test_parse_and_display() {
        for level in AlertLevel::ALL {
            assert_eq!(AlertLevel::from_str(level.as_str()).unwrap(), level);
            assert_eq!(level.to_string(), level.as_str());
        }
        assert_eq!(AlertLevel::from_str("RED").unwrap(), AlertLevel::Red);
        assert!(AlertLevel::from_str("purple").is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&AlertLevel::Orange).unwrap();
        assert_eq!(json, "\"orange\"");
        let level: AlertLevel = serde_json::from_str("\"yellow\"").unwrap();
        assert_eq!(level, AlertLevel::Yellow);
    }

    #[test]
    fn test_high_risk() {
        assert!(!AlertLevel::Green.is_high_risk());
        assert!(!AlertLevel::Yellow.is_high_risk());
        assert!(AlertLevel::Orange.is_high_risk());
        assert!(AlertLevel::Red.is_high_risk());
    }
}
