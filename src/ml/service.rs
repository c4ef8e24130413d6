use crate::error::{AppError, Result};
use crate::ml::artifacts;
use crate::ml::classifier::{AlertPipeline, Classifier};
use crate::ml::forest::argmax;
use crate::ml::models::ModelMetadata;
use crate::ml::preprocessing::LabelEncoder;
use crate::ml::scores::{aftershock_probability, risk_score, round1};
use crate::models::{AlertLevel, Observation};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Outcome of one inference call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Predicted alert level
    pub alert: AlertLevel,

    /// Heuristic risk score (0-100, one decimal)
    pub risk_score: f64,

    /// Probability of the predicted level as a percentage (0-100, one decimal)
    pub confidence: f64,

    /// Aftershock likelihood as a percentage (0-100, one decimal)
    pub aftershock_probability: f64,

    /// Full class probability vector keyed by label
    pub probabilities: BTreeMap<String, f64>,
}

impl PredictionResult {
    /// `(alert, risk, confidence, aftershock)`
    pub fn into_tuple(self) -> (String, f64, f64, f64) {
        (
            self.alert.to_string(),
            self.risk_score,
            self.confidence,
            self.aftershock_probability,
        )
    }
}

#[derive(Debug)]
struct LoadedModel {
    pipeline: AlertPipeline,
    encoder: LabelEncoder,
}

#[derive(Debug, Clone)]
enum ArtifactSource {
    Directory(PathBuf),
    InMemory,
}

/// Read-only handle on a trained pipeline and its label encoder.
///
/// Artifacts are loaded from disk on first use, exactly once, and shared by
/// every subsequent call. The handle is `Send + Sync`; wrap it in an `Arc` to
/// share it between threads.
#[derive(Debug)]
pub struct ModelHandle {
    source: ArtifactSource,
    model: OnceCell<LoadedModel>,
}

impl ModelHandle {
    /// Handle that lazily loads `best_model.bin` and `label_encoder.json` from `dir`
    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: ArtifactSource::Directory(dir.into()),
            model: OnceCell::new(),
        }
    }

    /// Handle over an already fitted pipeline and encoder
    pub fn from_parts(pipeline: AlertPipeline, encoder: LabelEncoder) -> Result<Self> {
        if pipeline.class_names() != encoder.classes() {
            return Err(AppError::Artifact(format!(
                "pipeline classes {:?} disagree with label encoder classes {:?}",
                pipeline.class_names(),
                encoder.classes()
            )));
        }
        if !pipeline.is_trained() {
            return Err(AppError::Artifact("pipeline is not trained".to_string()));
        }

        Ok(Self {
            source: ArtifactSource::InMemory,
            model: OnceCell::with_value(LoadedModel { pipeline, encoder }),
        })
    }

    /// Load the artifacts now instead of on the first prediction
    pub fn load(&self) -> Result<()> {
        self.model().map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.get().is_some()
    }

    /// Directory the artifacts are read from, if any
    pub fn artifacts_dir(&self) -> Option<&Path> {
        match &self.source {
            ArtifactSource::Directory(dir) => Some(dir),
            ArtifactSource::InMemory => None,
        }
    }

    pub fn metadata(&self) -> Result<&ModelMetadata> {
        Ok(self.model()?.pipeline.metadata())
    }

    fn model(&self) -> Result<&LoadedModel> {
        self.model.get_or_try_init(|| match &self.source {
            ArtifactSource::Directory(dir) => {
                let (pipeline, encoder) = artifacts::load(dir)?;
                info!(
                    dir = %dir.display(),
                    classes = ?encoder.classes(),
                    "Model loaded"
                );
                Ok(LoadedModel { pipeline, encoder })
            }
            ArtifactSource::InMemory => Err(AppError::Internal(
                "in-memory model handle has no model".to_string(),
            )),
        })
    }

    /// Classify one observation and attach the derived scores
    pub fn predict(&self, observation: &Observation) -> Result<PredictionResult> {
        let model = self.model()?;

        let named = observation.named_features();
        let names: Vec<&str> = named.iter().map(|(name, _)| *name).collect();
        let values: Vec<f64> = named.iter().map(|(_, value)| *value).collect();
        model.pipeline.check_schema(&names)?;

        let proba = model.pipeline.predict_proba_row(&values)?;
        if proba.len() != model.encoder.n_classes() {
            return Err(AppError::Artifact(format!(
                "model returned {} probabilities for {} classes",
                proba.len(),
                model.encoder.n_classes()
            )));
        }

        let code = argmax(&proba);
        let label = model.encoder.decode(code)?;
        let alert = label
            .parse::<AlertLevel>()
            .map_err(|_| AppError::Artifact(format!("encoder class '{}' is not an alert level", label)))?;

        let probabilities = model
            .encoder
            .classes()
            .iter()
            .cloned()
            .zip(proba.iter().copied())
            .collect();

        let result = PredictionResult {
            alert,
            risk_score: round1(risk_score(
                observation.magnitude,
                observation.depth,
                observation.mmi,
                observation.sig,
            )),
            confidence: round1(proba[code] * 100.0),
            aftershock_probability: round1(aftershock_probability(
                observation.magnitude,
                observation.depth,
            )),
            probabilities,
        };

        debug!(
            alert = %result.alert,
            confidence = result.confidence,
            risk = result.risk_score,
            "Prediction complete"
        );
        Ok(result)
    }
}

/// Predict an alert level for raw inputs.
///
/// Returns `(alert, risk_score, confidence, aftershock_probability)` with
/// percentages rounded to one decimal.
pub fn predict_alert(
    handle: &ModelHandle,
    magnitude: f64,
    depth: f64,
    cdi: f64,
    mmi: f64,
    sig: f64,
) -> Result<(String, f64, f64, f64)> {
    let observation = Observation::new(magnitude, depth, cdi, mmi, sig);
    handle.predict(&observation).map(PredictionResult::into_tuple)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::forest::ForestParams;
    use crate::ml::models::TrainingDataset;
    use ndarray::Array2;
    use std::sync::Arc;

    fn fitted(classes: &[&str]) -> (AlertPipeline, LabelEncoder) {
        let encoder = LabelEncoder::from_classes(classes).unwrap();
        let k = encoder.n_classes();
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..(k * 15) {
            let class = i % k;
            rows.extend_from_slice(&[
                4.0 + class as f64 * 1.5,
                20.0 + (i % 7) as f64,
                3.0,
                1.0 + class as f64 * 2.5,
                100.0,
            ]);
            labels.push(class);
        }
        let dataset =
            TrainingDataset::new(Array2::from_shape_vec((k * 15, 5), rows).unwrap(), labels)
                .unwrap();
        let params = ForestParams {
            n_estimators: 10,
            ..ForestParams::default()
        };
        let mut pipeline = AlertPipeline::new(params, encoder.classes().to_vec());
        pipeline.train(&dataset).unwrap();
        (pipeline, encoder)
    }

    fn handle() -> ModelHandle {
        let (pipeline, encoder) = fitted(&["green", "orange", "red", "yellow"]);
        ModelHandle::from_parts(pipeline, encoder).unwrap()
    }

    #[test]
    fn test_end_to_end_scores() {
        let (alert, risk, confidence, aftershock) =
            predict_alert(&handle(), 6.5, 50.0, 5.0, 5.0, 100.0).unwrap();

        assert!(["green", "yellow", "orange", "red"].contains(&alert.as_str()));
        assert_eq!(risk, 100.0);
        assert_eq!(aftershock, 76.7);
        assert!((0.0..=100.0).contains(&confidence));
    }

    #[test]
    fn test_confidence_is_max_probability() {
        let result = handle()
            .predict(&Observation::new(5.5, 25.0, 3.0, 3.5, 100.0))
            .unwrap();

        let max = result.probabilities.values().cloned().fold(0.0, f64::max);
        assert_eq!(result.confidence, round1(max * 100.0));
        assert_eq!(result.probabilities.len(), 4);
        let total: f64 = result.probabilities.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(result.probabilities[result.alert.as_str()] >= max - 1e-12);
    }

    #[test]
    fn test_separable_inputs_are_classified() {
        // Class codes: green=0, orange=1, red=2, yellow=3
        let handle = handle();
        let red = handle.predict(&Observation::new(7.0, 22.0, 3.0, 6.0, 100.0)).unwrap();
        let green = handle.predict(&Observation::new(4.0, 22.0, 3.0, 1.0, 100.0)).unwrap();
        assert_eq!(red.alert, AlertLevel::Red);
        assert_eq!(green.alert, AlertLevel::Green);
    }

    #[test]
    fn test_missing_artifacts_fail() {
        let dir = tempfile::tempdir().unwrap();
        let handle = ModelHandle::from_dir(dir.path());

        assert!(!handle.is_loaded());
        let err = predict_alert(&handle, 6.5, 50.0, 5.0, 5.0, 100.0).unwrap_err();
        assert!(matches!(err, AppError::ArtifactMissing(_)));
        assert!(!handle.is_loaded());
    }

    #[test]
    fn test_handle_loads_once_and_is_shareable() {
        let dir = tempfile::tempdir().unwrap();
        let (pipeline, encoder) = fitted(&["green", "orange", "red", "yellow"]);
        artifacts::save(dir.path(), &pipeline, &encoder, uuid::Uuid::new_v4()).unwrap();

        let handle = Arc::new(ModelHandle::from_dir(dir.path()));
        handle.load().unwrap();
        assert!(handle.is_loaded());
        assert_eq!(handle.artifacts_dir(), Some(dir.path()));

        // Removing the files after loading does not affect the handle
        std::fs::remove_file(dir.path().join(artifacts::MODEL_FILE)).unwrap();

        let threads: Vec<_> = (0..4)
            .map(|i| {
                let handle = Arc::clone(&handle);
                std::thread::spawn(move || {
                    predict_alert(&handle, 4.0 + i as f64, 30.0, 3.0, 4.0, 200.0).unwrap()
                })
            })
            .collect();
        for t in threads {
            let (alert, ..) = t.join().unwrap();
            assert!(alert.parse::<AlertLevel>().is_ok());
        }
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let (pipeline, _) = fitted(&["green", "red"]);
        let encoder = LabelEncoder::from_classes(&["green", "orange", "red"]).unwrap();
        assert!(matches!(
            ModelHandle::from_parts(pipeline, encoder),
            Err(AppError::Artifact(_))
        ));

        let untrained = AlertPipeline::new(ForestParams::default(), vec!["green".to_string()]);
        let encoder = LabelEncoder::from_classes(&["green"]).unwrap();
        assert!(ModelHandle::from_parts(untrained, encoder).is_err());
    }

    #[test]
    fn test_schema_mismatch_is_rejected_by_predict() {
        let (pipeline, encoder) = fitted(&["green", "orange", "red", "yellow"]);
        let renamed = ["magnitude", "depth", "cdi", "mmi", "significance"];
        let pipeline = pipeline.with_feature_names(renamed.iter().map(|s| s.to_string()).collect());
        let handle = ModelHandle::from_parts(pipeline, encoder).unwrap();

        match predict_alert(&handle, 6.5, 50.0, 5.0, 5.0, 100.0) {
            Err(AppError::SchemaMismatch { expected, actual }) => {
                assert_eq!(expected, renamed);
                assert_eq!(actual.last().map(String::as_str), Some("sig"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_non_alert_classes_are_rejected() {
        let (pipeline, encoder) = fitted(&["high", "low"]);
        let handle = ModelHandle::from_parts(pipeline, encoder).unwrap();
        let err = handle
            .predict(&Observation::new(5.0, 30.0, 3.0, 3.0, 100.0))
            .unwrap_err();
        assert!(matches!(err, AppError::Artifact(_)));
    }

    #[test]
    fn test_metadata_is_available() {
        let handle = handle();
        let metadata = handle.metadata().unwrap();
        assert_eq!(metadata.n_features, 5);
        assert_eq!(metadata.n_training_samples, 60);
    }
}
