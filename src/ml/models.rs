use crate::error::{AppError, Result};
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Training dataset: feature matrix with encoded class labels
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features); missing values are NaN
    pub features: Array2<f64>,

    /// Encoded class labels
    pub labels: Vec<usize>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(AppError::Internal(format!(
                "feature matrix has {} rows but {} labels were given",
                features.nrows(),
                labels.len()
            )));
        }

        let (n_samples, n_features) = features.dim();
        Ok(Self {
            features,
            labels,
            n_samples,
            n_features,
        })
    }

    /// Rows at the given indices, in that order
    pub fn subset(&self, indices: &[usize]) -> TrainingDataset {
        let features = self.features.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        TrainingDataset {
            features,
            labels,
            n_samples: indices.len(),
            n_features: self.n_features,
        }
    }

    /// Number of samples per class code
    pub fn class_counts(&self, n_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; n_classes];
        for &label in &self.labels {
            if label < n_classes {
                counts[label] += 1;
            }
        }
        counts
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Accuracy
    pub accuracy: f64,

    /// Support-weighted precision
    pub precision: f64,

    /// Support-weighted recall
    pub recall: f64,

    /// Support-weighted F1 score
    pub f1_score: f64,

    /// Confusion matrix (rows = true class, columns = predicted class)
    pub confusion_matrix: Option<Array2<usize>>,

    /// Per-class metrics keyed by class label
    pub per_class_metrics: BTreeMap<String, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self {
            accuracy: 0.0,
            precision: 0.0,
            recall: 0.0,
            f1_score: 0.0,
            confusion_matrix: None,
            per_class_metrics: BTreeMap::new(),
        }
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Crate version that produced the model
    pub version: String,

    /// Training run identifier, shared with the label encoder artifact
    pub run_id: Uuid,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Training metrics
    pub training_metrics: ModelMetrics,

    /// Held-out test metrics
    pub validation_metrics: Option<ModelMetrics>,

    /// Mean cross-validated weighted F1 of the selected configuration
    pub cv_score: Option<f64>,

    /// Hyperparameters
    pub hyperparameters: HashMap<String, String>,
}

impl ModelMetadata {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            run_id: Uuid::nil(),
            trained_at: chrono::Utc::now(),
            n_training_samples: 0,
            n_features: 0,
            training_metrics: ModelMetrics::new(),
            validation_metrics: None,
            cv_score: None,
            hyperparameters: HashMap::new(),
        }
    }
}
