use crate::error::{AppError, Result};
use crate::ml::forest::{ForestParams, RandomForest};
use crate::ml::metrics::calculate_metrics;
use crate::ml::models::{ModelMetadata, ModelMetrics, TrainingDataset};
use crate::ml::preprocessing::MedianImputer;
use crate::models::FEATURE_NAMES;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trait for classifiers
pub trait Classifier: Send + Sync {
    /// Train the classifier and return its metrics on the training data
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics>;

    /// Predict class codes
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Predict class probabilities (n_samples × n_classes)
    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Median imputation followed by a random forest.
///
/// The pipeline owns the feature names it was trained on and refuses inputs
/// with any other schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPipeline {
    /// Model metadata
    metadata: ModelMetadata,

    /// Feature names in training column order
    feature_names: Vec<String>,

    /// Class labels, indexed by class code
    class_names: Vec<String>,

    /// Forest hyperparameters
    params: ForestParams,

    /// Fitted imputer
    imputer: MedianImputer,

    /// Trained forest
    forest: Option<RandomForest>,
}

impl AlertPipeline {
    pub fn new(params: ForestParams, class_names: Vec<String>) -> Self {
        let mut metadata = ModelMetadata::new("Alert Random Forest");
        metadata.hyperparameters.insert("n_estimators".to_string(), params.n_estimators.to_string());
        metadata.hyperparameters.insert(
            "max_depth".to_string(),
            params.max_depth.map_or_else(|| "None".to_string(), |d| d.to_string()),
        );
        metadata
            .hyperparameters
            .insert("min_samples_split".to_string(), params.min_samples_split.to_string());
        metadata.hyperparameters.insert("class_weight".to_string(), "balanced".to_string());
        metadata.hyperparameters.insert("seed".to_string(), params.seed.to_string());

        Self {
            metadata,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            class_names,
            params,
            imputer: MedianImputer::new(),
            forest: None,
        }
    }

    /// Replace the feature schema, in training column order
    pub fn with_feature_names(mut self, feature_names: Vec<String>) -> Self {
        self.feature_names = feature_names;
        self
    }

    /// Verify that `names` matches the training feature set, in order
    pub fn check_schema<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let matches = names.len() == self.feature_names.len()
            && names
                .iter()
                .zip(&self.feature_names)
                .all(|(a, b)| a.as_ref() == b);

        if matches {
            Ok(())
        } else {
            Err(AppError::SchemaMismatch {
                expected: self.feature_names.clone(),
                actual: names.iter().map(|n| n.as_ref().to_string()).collect(),
            })
        }
    }

    /// Class probabilities for a single feature row
    pub fn predict_proba_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        let forest = self.forest()?;
        let mut imputed = row.to_vec();
        self.imputer.transform_row(&mut imputed)?;
        Ok(forest.predict_proba_row(&imputed))
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn metadata_mut(&mut self) -> &mut ModelMetadata {
        &mut self.metadata
    }

    fn forest(&self) -> Result<&RandomForest> {
        self.forest
            .as_ref()
            .ok_or_else(|| AppError::Internal("Model not trained".to_string()))
    }
}

impl Classifier for AlertPipeline {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        if dataset.n_features != self.feature_names.len() {
            return Err(AppError::Internal(format!(
                "pipeline expects {} features, dataset has {}",
                self.feature_names.len(),
                dataset.n_features
            )));
        }

        let imputed = self.imputer.fit_transform(&dataset.features)?;
        let forest = RandomForest::fit(
            imputed.view(),
            &dataset.labels,
            self.class_names.len(),
            self.params,
        )?;

        let predictions = forest.predict(imputed.view())?;
        let metrics = calculate_metrics(&dataset.labels, &predictions, &self.class_names);
        debug!(
            params = %self.params,
            samples = dataset.n_samples,
            accuracy = metrics.accuracy,
            "Forest trained"
        );

        self.forest = Some(forest);
        self.metadata.n_training_samples = dataset.n_samples;
        self.metadata.n_features = dataset.n_features;
        self.metadata.trained_at = chrono::Utc::now();
        self.metadata.training_metrics = metrics.clone();

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        let forest = self.forest()?;
        let imputed = self.imputer.transform(features)?;
        forest.predict(imputed.view())
    }

    fn predict_proba(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let forest = self.forest()?;
        let imputed = self.imputer.transform(features)?;
        forest.predict_proba(imputed.view())
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn is_trained(&self) -> bool {
        self.forest.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn class_names() -> Vec<String> {
        vec!["green".to_string(), "orange".to_string(), "red".to_string()]
    }

    fn create_test_dataset(n_samples: usize) -> TrainingDataset {
        let mut rows = Vec::with_capacity(n_samples * 5);
        let mut labels = Vec::with_capacity(n_samples);
        for i in 0..n_samples {
            let class = i % 3;
            let magnitude = 5.0 + class as f64 + (i % 5) as f64 * 0.1;
            let mmi = 2.0 + class as f64 * 3.0;
            rows.extend_from_slice(&[magnitude, 10.0 + i as f64, 3.0, mmi, 100.0]);
            labels.push(class);
        }
        let features = Array2::from_shape_vec((n_samples, 5), rows).unwrap();
        TrainingDataset::new(features, labels).unwrap()
    }

    fn params() -> ForestParams {
        ForestParams {
            n_estimators: 20,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_alert_pipeline_training() {
        let dataset = create_test_dataset(90);
        let mut pipeline = AlertPipeline::new(params(), class_names());
        assert!(!pipeline.is_trained());

        let metrics = pipeline.train(&dataset).unwrap();

        assert!(pipeline.is_trained());
        assert!(metrics.accuracy > 0.9);
        assert_eq!(pipeline.metadata().n_training_samples, 90);
        assert_eq!(pipeline.metadata().hyperparameters["n_estimators"], "20");
        assert_eq!(pipeline.metadata().hyperparameters["max_depth"], "None");
    }

    #[test]
    fn test_predict_proba_shape_and_row_agreement() {
        let dataset = create_test_dataset(60);
        let mut pipeline = AlertPipeline::new(params(), class_names());
        pipeline.train(&dataset).unwrap();

        let proba = pipeline.predict_proba(&dataset.features).unwrap();
        assert_eq!(proba.dim(), (60, 3));

        let row: Vec<f64> = dataset.features.row(4).to_vec();
        let single = pipeline.predict_proba_row(&row).unwrap();
        for (a, b) in single.iter().zip(proba.row(4).iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_missing_values_are_imputed() {
        let dataset = create_test_dataset(60);
        let mut pipeline = AlertPipeline::new(params(), class_names());
        pipeline.train(&dataset).unwrap();

        let x = array![[f64::NAN, 20.0, f64::NAN, 8.0, 100.0]];
        let predictions = pipeline.predict(&x).unwrap();
        assert_eq!(predictions.len(), 1);
        assert!(predictions[0] < 3);
    }

    #[test]
    fn test_untrained_pipeline_errors() {
        let pipeline = AlertPipeline::new(params(), class_names());
        assert!(pipeline.predict(&array![[1.0, 2.0, 3.0, 4.0, 5.0]]).is_err());
        assert!(pipeline.predict_proba_row(&[1.0, 2.0, 3.0, 4.0, 5.0]).is_err());
    }

    #[test]
    fn test_schema_check() {
        let pipeline = AlertPipeline::new(params(), class_names());
        assert!(pipeline.check_schema(&FEATURE_NAMES).is_ok());

        let err = pipeline
            .check_schema(&["magnitude", "depth", "cdi", "sig", "mmi"])
            .unwrap_err();
        match err {
            AppError::SchemaMismatch { expected, actual } => {
                assert_eq!(expected[3], "mmi");
                assert_eq!(actual[3], "sig");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(pipeline.check_schema(&["magnitude"]).is_err());
    }

    #[test]
    fn test_pipeline_rejects_wrong_width() {
        let features = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let dataset = TrainingDataset::new(features, vec![0, 1, 2]).unwrap();
        let mut pipeline = AlertPipeline::new(params(), class_names());
        assert!(pipeline.train(&dataset).is_err());
    }
}
