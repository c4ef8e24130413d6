//! Feature/label preparation
//!
//! Turns a raw CSV table into a numeric feature matrix and alert labels,
//! encodes labels to class codes, imputes missing values and partitions
//! rows into train/test sets.

use crate::dataset::io::RawTable;
use crate::error::{AppError, Result};
use crate::models::{AlertLevel, FEATURE_NAMES, LABEL_COLUMN};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Feature matrix and labels extracted from a raw table
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Feature column names, in matrix column order
    pub feature_names: Vec<String>,

    /// Feature matrix; empty cells are NaN
    pub features: Array2<f64>,

    /// Alert label per row
    pub labels: Vec<AlertLevel>,
}

/// Strip surrounding whitespace from every column name
pub fn normalize_columns(columns: &[String]) -> Vec<String> {
    columns.iter().map(|c| c.trim().to_string()).collect()
}

fn locate_column(normalized: &[String], name: &str) -> Result<usize> {
    normalized.iter().position(|c| c == name).ok_or_else(|| {
        AppError::Data(format!(
            "required column '{}' not found; available columns: {:?}",
            name, normalized
        ))
    })
}

/// Parse the label column of a table into alert levels
pub fn extract_labels(table: &RawTable) -> Result<Vec<AlertLevel>> {
    let columns = normalize_columns(&table.columns);
    let label_idx = locate_column(&columns, LABEL_COLUMN)?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(row_no, row)| parse_label(&row[label_idx], row_no))
        .collect()
}

fn parse_label(cell: &str, row_no: usize) -> Result<AlertLevel> {
    let value = cell.trim();
    if value.is_empty() {
        return Err(AppError::Data(format!(
            "row {}: missing value in label column '{}'",
            row_no + 1,
            LABEL_COLUMN
        )));
    }
    value.parse::<AlertLevel>().map_err(|_| {
        AppError::Data(format!(
            "row {}: unknown alert level '{}'",
            row_no + 1,
            value
        ))
    })
}

fn parse_feature(cell: &str, row_no: usize, column: &str) -> Result<f64> {
    let value = cell.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") || value.eq_ignore_ascii_case("na") {
        return Ok(f64::NAN);
    }
    value.parse::<f64>().map_err(|_| {
        AppError::Data(format!(
            "row {}: column '{}': cannot parse '{}' as a number",
            row_no + 1,
            column,
            value
        ))
    })
}

/// Normalize columns, separate features from the label and parse all cells.
/// Columns other than the five features and the label are ignored.
pub fn prepare(table: &RawTable) -> Result<PreparedData> {
    let columns = normalize_columns(&table.columns);

    // Schema first: fail before touching any row
    let label_idx = locate_column(&columns, LABEL_COLUMN)?;
    let feature_idx = FEATURE_NAMES
        .iter()
        .map(|name| locate_column(&columns, name))
        .collect::<Result<Vec<usize>>>()?;

    if table.is_empty() {
        return Err(AppError::Data("dataset contains no rows".to_string()));
    }

    let n_rows = table.len();
    let mut features = Array2::<f64>::zeros((n_rows, FEATURE_NAMES.len()));
    let mut labels = Vec::with_capacity(n_rows);
    let mut missing = 0usize;

    for (row_no, row) in table.rows.iter().enumerate() {
        for (j, &idx) in feature_idx.iter().enumerate() {
            let value = parse_feature(&row[idx], row_no, FEATURE_NAMES[j])?;
            if value.is_nan() {
                missing += 1;
            }
            features[[row_no, j]] = value;
        }
        labels.push(parse_label(&row[label_idx], row_no)?);
    }

    if missing > 0 {
        warn!(missing_cells = missing, "Dataset has missing feature values; they will be imputed");
    }
    debug!(rows = n_rows, "Dataset prepared");

    Ok(PreparedData {
        feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
        features,
        labels,
    })
}

/// Bijective mapping between label strings and class codes.
///
/// Classes are kept in lexicographic order, so the code of a label depends only
/// on the set of labels seen during fitting (green=0, orange=1, red=2, yellow=3
/// for the full alert set).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: Vec<String>,
}

impl LabelEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an encoder from an explicit class list (sorted and deduplicated)
    pub fn from_classes<S: AsRef<str>>(classes: &[S]) -> Result<Self> {
        let mut encoder = Self::new();
        encoder.fit(classes)?;
        Ok(encoder)
    }

    pub fn fit<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<()> {
        let classes: BTreeSet<String> = labels.iter().map(|l| l.as_ref().to_string()).collect();
        if classes.is_empty() {
            return Err(AppError::Data(
                "cannot fit label encoder on an empty label set".to_string(),
            ));
        }
        self.classes = classes.into_iter().collect();
        Ok(())
    }

    pub fn fit_transform<S: AsRef<str>>(&mut self, labels: &[S]) -> Result<Vec<usize>> {
        self.fit(labels)?;
        self.transform(labels)
    }

    pub fn transform<S: AsRef<str>>(&self, labels: &[S]) -> Result<Vec<usize>> {
        labels.iter().map(|l| self.encode(l.as_ref())).collect()
    }

    pub fn encode(&self, label: &str) -> Result<usize> {
        self.classes
            .binary_search_by(|c| c.as_str().cmp(label))
            .map_err(|_| AppError::Data(format!("label '{}' was not seen during fitting", label)))
    }

    pub fn inverse_transform(&self, codes: &[usize]) -> Result<Vec<String>> {
        codes
            .iter()
            .map(|&code| self.decode(code).map(str::to_string))
            .collect()
    }

    pub fn decode(&self, code: usize) -> Result<&str> {
        self.classes.get(code).map(String::as_str).ok_or_else(|| {
            AppError::Artifact(format!(
                "class code {} is outside the label encoder's {} classes",
                code,
                self.classes.len()
            ))
        })
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn is_fitted(&self) -> bool {
        !self.classes.is_empty()
    }
}

/// Replaces missing (NaN) values with the per-column median seen during fitting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedianImputer {
    medians: Vec<f64>,
}

impl MedianImputer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, features: &Array2<f64>) -> Result<()> {
        let mut medians = Vec::with_capacity(features.ncols());

        for (j, column) in features.columns().into_iter().enumerate() {
            let mut present: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            if present.is_empty() {
                return Err(AppError::Data(format!(
                    "feature column {} has no observed values to impute from",
                    j
                )));
            }
            medians.push(median(&mut present));
        }

        self.medians = medians;
        Ok(())
    }

    pub fn transform(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(features.ncols())?;

        let mut imputed = features.clone();
        for mut row in imputed.rows_mut() {
            for (value, &median) in row.iter_mut().zip(&self.medians) {
                if value.is_nan() {
                    *value = median;
                }
            }
        }
        Ok(imputed)
    }

    pub fn fit_transform(&mut self, features: &Array2<f64>) -> Result<Array2<f64>> {
        self.fit(features)?;
        self.transform(features)
    }

    /// Impute a single row in place
    pub fn transform_row(&self, row: &mut [f64]) -> Result<()> {
        self.check_width(row.len())?;
        for (value, &median) in row.iter_mut().zip(&self.medians) {
            if value.is_nan() {
                *value = median;
            }
        }
        Ok(())
    }

    pub fn medians(&self) -> &[f64] {
        &self.medians
    }

    pub fn is_fitted(&self) -> bool {
        !self.medians.is_empty()
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if !self.is_fitted() {
            return Err(AppError::Internal(
                "MedianImputer must be fitted before transform".to_string(),
            ));
        }
        if width != self.medians.len() {
            return Err(AppError::Internal(format!(
                "imputer was fitted on {} features, got {}",
                self.medians.len(),
                width
            )));
        }
        Ok(())
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle rows with a fixed seed and hold out `ceil(n * test_size)` of them.
///
/// With `stratify`, each class contributes to the test set in proportion to its
/// frequency (largest remainders get the leftover slots).
pub fn train_test_split(labels: &[usize], test_size: f64, seed: u64, stratify: bool) -> Result<Split> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(AppError::Configuration(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n = labels.len();
    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(AppError::Data(format!(
            "cannot split {} rows with test_size {}",
            n, test_size
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);

    if !stratify {
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let train = indices.split_off(n_test);
        return Ok(Split { train, test: indices });
    }

    let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (i, &label) in labels.iter().enumerate() {
        by_class[label].push(i);
    }

    // Proportional allocation with largest-remainder rounding
    let mut allocation: Vec<usize> = Vec::with_capacity(n_classes);
    let mut remainders: Vec<(f64, usize)> = Vec::with_capacity(n_classes);
    for (class, members) in by_class.iter().enumerate() {
        let exact = n_test as f64 * members.len() as f64 / n as f64;
        allocation.push(exact.floor() as usize);
        remainders.push((exact - exact.floor(), class));
    }
    remainders.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut leftover = n_test - allocation.iter().sum::<usize>();
    for &(_, class) in remainders.iter().cycle().take(remainders.len() * 2) {
        if leftover == 0 {
            break;
        }
        if allocation[class] < by_class[class].len() {
            allocation[class] += 1;
            leftover -= 1;
        }
    }

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (class, members) in by_class.iter_mut().enumerate() {
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..allocation[class]]);
        train.extend_from_slice(&members[allocation[class]..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Ok(Split { train, test })
}
