use crate::config::GeneratorConfig;
use crate::dataset::io::write_dataset;
use crate::error::Result;
use crate::models::{AlertLevel, LabeledObservation, Observation};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tracing::info;

/// Sampling range and precision for one generated column
#[derive(Debug, Clone, Copy)]
struct ColumnRange {
    low: f64,
    high: f64,
    decimals: i32,
}

/// Realistic USGS-style ranges, in feature order (magnitude, depth, cdi, mmi, sig)
const COLUMN_RANGES: [ColumnRange; 5] = [
    ColumnRange { low: 4.0, high: 9.2, decimals: 2 },
    ColumnRange { low: 5.0, high: 700.0, decimals: 1 },
    ColumnRange { low: 0.0, high: 10.0, decimals: 2 },
    ColumnRange { low: 1.0, high: 10.0, decimals: 2 },
    ColumnRange { low: 0.0, high: 1800.0, decimals: 1 },
];

/// Derive the alert level from magnitude and MMI thresholds; first match wins
pub fn assign_alert(magnitude: f64, mmi: f64) -> AlertLevel {
    if magnitude >= 7.5 || mmi >= 8.0 {
        AlertLevel::Red
    } else if magnitude >= 6.5 || mmi >= 6.0 {
        AlertLevel::Orange
    } else if magnitude >= 5.5 || mmi >= 4.0 {
        AlertLevel::Yellow
    } else {
        AlertLevel::Green
    }
}

/// Seeded synthetic dataset generator
#[derive(Debug, Clone)]
pub struct DatasetGenerator {
    rows: usize,
    seed: u64,
}

impl DatasetGenerator {
    pub fn new(rows: usize, seed: u64) -> Self {
        Self { rows, seed }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.rows, config.seed)
    }

    /// Generate labeled observations. Columns are drawn one after another from a
    /// single seeded stream, so a given (rows, seed) always yields the same table.
    pub fn generate(&self) -> Vec<LabeledObservation> {
        let mut rng = StdRng::seed_from_u64(self.seed);

        let mut columns: Vec<Vec<f64>> = Vec::with_capacity(COLUMN_RANGES.len());
        for range in &COLUMN_RANGES {
            let mut column = Vec::with_capacity(self.rows);
            for _ in 0..self.rows {
                let value: f64 = rng.gen_range(range.low..range.high);
                column.push(round_to(value, range.decimals));
            }
            columns.push(column);
        }

        (0..self.rows)
            .map(|i| {
                let observation = Observation::new(
                    columns[0][i],
                    columns[1][i],
                    columns[2][i],
                    columns[3][i],
                    columns[4][i],
                );
                LabeledObservation {
                    observation,
                    alert: assign_alert(observation.magnitude, observation.mmi),
                }
            })
            .collect()
    }

    /// Generate and write the dataset as CSV, returning the number of rows written
    pub fn write_csv(&self, path: &Path) -> Result<usize> {
        let rows = self.generate();
        write_dataset(path, &rows)?;

        info!(
            rows = rows.len(),
            seed = self.seed,
            path = %path.display(),
            "Synthetic earthquake dataset generated"
        );

        Ok(rows.len())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FEATURE_NAMES;
    use validator::Validate;

    #[test]
    fn test_assign_alert_thresholds() {
        assert_eq!(assign_alert(7.5, 5.0), AlertLevel::Red);
        assert_eq!(assign_alert(5.0, 9.0), AlertLevel::Red);
        assert_eq!(assign_alert(4.0, 2.0), AlertLevel::Green);
        assert_eq!(assign_alert(6.5, 1.0), AlertLevel::Orange);
        assert_eq!(assign_alert(4.0, 6.0), AlertLevel::Orange);
        assert_eq!(assign_alert(5.5, 3.99), AlertLevel::Yellow);
        assert_eq!(assign_alert(5.49, 4.0), AlertLevel::Yellow);
        assert_eq!(assign_alert(5.49, 3.99), AlertLevel::Green);
    }

    #[test]
    fn test_assign_alert_priority_order() {
        // Qualifies for every level; red is checked first
        assert_eq!(assign_alert(9.0, 9.0), AlertLevel::Red);
        assert_eq!(assign_alert(7.49, 7.99), AlertLevel::Orange);
    }

    #[test]
    fn test_generation_is_reproducible() {
        let first = DatasetGenerator::new(1000, 42).generate();
        let second = DatasetGenerator::new(1000, 42).generate();

        assert_eq!(first.len(), 1000);
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = DatasetGenerator::new(50, 42).generate();
        let b = DatasetGenerator::new(50, 43).generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_generated_rows_are_valid_and_labeled() {
        let rows = DatasetGenerator::new(500, 7).generate();

        for row in &rows {
            let obs = row.observation;
            assert!(obs.validate().is_ok(), "out of range: {:?}", obs);
            assert!((4.0..=9.2).contains(&obs.magnitude));
            assert!((5.0..=700.0).contains(&obs.depth));
            assert!((1.0..=10.0).contains(&obs.mmi));
            assert_eq!(row.alert, assign_alert(obs.magnitude, obs.mmi));
        }
        assert_eq!(FEATURE_NAMES.len(), COLUMN_RANGES.len());
    }

    #[test]
    fn test_values_are_rounded() {
        let rows = DatasetGenerator::new(100, 1).generate();
        for row in &rows {
            let obs = row.observation;
            assert_eq!(obs.magnitude, round_to(obs.magnitude, 2));
            assert_eq!(obs.depth, round_to(obs.depth, 1));
            assert_eq!(obs.sig, round_to(obs.sig, 1));
        }
    }

    #[test]
    fn test_all_levels_present_in_default_dataset() {
        let rows = DatasetGenerator::new(1000, 42).generate();
        for level in AlertLevel::ALL {
            assert!(rows.iter().any(|r| r.alert == level), "missing {}", level);
        }
    }
}
