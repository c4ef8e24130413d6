use serde::{Deserialize, Serialize};
use validator::Validate;

use super::alert_level::AlertLevel;

/// Feature columns, in the order the classifier consumes them
pub const FEATURE_NAMES: [&str; 5] = ["magnitude", "depth", "cdi", "mmi", "sig"];

/// Label column in datasets
pub const LABEL_COLUMN: &str = "alert";

/// Measured and derived attributes of one seismic event
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
pub struct Observation {
    /// Event magnitude
    #[validate(range(min = 0.0, max = 10.0))]
    pub magnitude: f64,

    /// Hypocenter depth (km)
    #[validate(range(min = 0.0, max = 700.0))]
    pub depth: f64,

    /// Community decimal intensity
    #[validate(range(min = 0.0, max = 10.0))]
    pub cdi: f64,

    /// Modified Mercalli intensity
    #[validate(range(min = 0.0, max = 10.0))]
    pub mmi: f64,

    /// Significance
    #[validate(range(min = 0.0, max = 1800.0))]
    pub sig: f64,
}

impl Observation {
    pub fn new(magnitude: f64, depth: f64, cdi: f64, mmi: f64, sig: f64) -> Self {
        Self {
            magnitude,
            depth,
            cdi,
            mmi,
            sig,
        }
    }

    /// Feature values in `FEATURE_NAMES` order
    pub fn to_features(&self) -> [f64; 5] {
        [self.magnitude, self.depth, self.cdi, self.mmi, self.sig]
    }

    /// Feature values keyed by column name
    pub fn named_features(&self) -> [(&'static str, f64); 5] {
        let values = self.to_features();
        [
            (FEATURE_NAMES[0], values[0]),
            (FEATURE_NAMES[1], values[1]),
            (FEATURE_NAMES[2], values[2]),
            (FEATURE_NAMES[3], values[3]),
            (FEATURE_NAMES[4], values[4]),
        ]
    }
}

/// An observation with its ground-truth alert level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledObservation {
    pub observation: Observation,
    pub alert: AlertLevel,
}
