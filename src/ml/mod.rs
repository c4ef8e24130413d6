//! Machine learning for earthquake alert classification
//!
//! This module provides:
//! - Feature/label preparation (label encoding, median imputation, train/test split)
//! - A class-balanced random forest with grid search over stratified k-fold CV
//! - Classification metrics and training reports
//! - Artifact persistence for the fitted pipeline and label encoder
//! - Deterministic risk and aftershock scores
//! - The inference service that combines model output with the derived scores

pub mod artifacts;
pub mod classifier;
pub mod forest;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod scores;
pub mod search;
pub mod service;
pub mod trainer;

pub use artifacts::{ArtifactPaths, ENCODER_FILE, MODEL_FILE};
pub use classifier::{AlertPipeline, Classifier};
pub use forest::{ForestParams, RandomForest};
pub use metrics::{calculate_metrics, classification_report};
pub use models::{ClassMetrics, ModelMetadata, ModelMetrics, TrainingDataset};
pub use preprocessing::{LabelEncoder, MedianImputer};
pub use scores::{aftershock_probability, risk_score};
pub use search::{GridSearch, ParamGrid, StratifiedKFold};
pub use service::{predict_alert, ModelHandle, PredictionResult};
pub use trainer::{ModelTrainer, TrainedModel, TrainingSummary};
