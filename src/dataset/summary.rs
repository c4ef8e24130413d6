use crate::dataset::io::RawTable;
use crate::error::Result;
use crate::ml::preprocessing::extract_labels;
use crate::models::AlertLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Alert distribution statistics for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    /// Total number of events
    pub total: usize,

    /// Events per alert level (every level present, possibly zero)
    pub counts: BTreeMap<AlertLevel, usize>,

    /// Orange and red events
    pub high_risk: usize,

    /// Most frequent level; ties go to the less severe level
    pub most_common: Option<AlertLevel>,
}

impl DatasetSummary {
    pub fn from_labels(labels: &[AlertLevel]) -> Self {
        let mut counts: BTreeMap<AlertLevel, usize> =
            AlertLevel::ALL.iter().map(|&level| (level, 0)).collect();
        for label in labels {
            *counts.entry(*label).or_insert(0) += 1;
        }

        let high_risk = labels.iter().filter(|l| l.is_high_risk()).count();

        let mut most_common: Option<(AlertLevel, usize)> = None;
        for (&level, &count) in &counts {
            if count > 0 && most_common.map_or(true, |(_, best)| count > best) {
                most_common = Some((level, count));
            }
        }

        Self {
            total: labels.len(),
            counts,
            high_risk,
            most_common: most_common.map(|(level, _)| level),
        }
    }

    /// Summarize the label column of a raw table
    pub fn from_table(table: &RawTable) -> Result<Self> {
        let labels = extract_labels(table)?;
        Ok(Self::from_labels(&labels))
    }

    /// Share of a level in the dataset (0.0 - 1.0)
    pub fn fraction(&self, level: AlertLevel) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.counts.get(&level).copied().unwrap_or(0) as f64 / self.total as f64
    }
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total earthquakes: {}", self.total)?;
        writeln!(f, "High risk events:  {} (orange / red)", self.high_risk)?;
        match self.most_common {
            Some(level) => writeln!(f, "Most common alert: {}", level.as_str().to_uppercase())?,
            None => writeln!(f, "Most common alert: n/a")?,
        }
        writeln!(f, "Alert distribution:")?;
        for (level, count) in &self.counts {
            writeln!(
                f,
                "  {:<7} {:>6}  ({:>5.1}%)",
                level.as_str(),
                count,
                self.fraction(*level) * 100.0
            )?;
        }
        Ok(())
    }
}
