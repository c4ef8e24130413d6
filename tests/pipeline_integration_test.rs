/// Integration tests for the alert classification pipeline
///
/// These tests exercise the complete flow:
/// - Synthetic dataset generation and CSV round trip
/// - Training with grid search and artifact persistence
/// - Inference through a model handle
/// - Failure modes (missing artifacts, mixed runs, schema, insufficient data)

use quake_alert::{
    config::TrainingConfig,
    dataset::{read_table, DatasetGenerator, DatasetSummary},
    error::AppError,
    ml::{
        artifacts::{self, ENCODER_FILE, MODEL_FILE},
        predict_alert, Classifier, ModelHandle, ModelTrainer, ParamGrid, TrainingSummary,
    },
    models::{AlertLevel, Observation},
};
use std::path::Path;
use tempfile::TempDir;

fn quick_trainer() -> ModelTrainer {
    let config = TrainingConfig {
        cv_folds: 3,
        n_jobs: 2,
        ..TrainingConfig::default()
    };
    ModelTrainer::new(config).with_grid(ParamGrid {
        n_estimators: vec![20],
        max_depth: vec![Some(10), None],
        min_samples_split: vec![2, 5],
    })
}

/// Generate a dataset and train into a fresh artifacts directory
fn train_into(dir: &Path, rows: usize) -> TrainingSummary {
    let dataset = dir.join("data").join("quakes.csv");
    DatasetGenerator::new(rows, 42).write_csv(&dataset).unwrap();
    quick_trainer()
        .train_and_persist(&dataset, &dir.join("models"))
        .unwrap()
}

#[test]
fn test_train_then_predict_end_to_end() {
    let dir = TempDir::new().unwrap();
    let summary = train_into(dir.path(), 300);

    assert_eq!(summary.n_train + summary.n_test, 300);
    assert_eq!(summary.candidates.len(), 4);
    assert!(summary.test_metrics.accuracy > 0.6);
    assert!(dir.path().join("models").join(MODEL_FILE).exists());
    assert!(dir.path().join("models").join(ENCODER_FILE).exists());

    let handle = ModelHandle::from_dir(dir.path().join("models"));
    let (alert, risk, confidence, aftershock) =
        predict_alert(&handle, 6.5, 50.0, 5.0, 5.0, 100.0).unwrap();

    assert!(alert.parse::<AlertLevel>().is_ok());
    assert_eq!(risk, 100.0);
    assert_eq!(aftershock, 76.7);
    assert!((0.0..=100.0).contains(&confidence));
    assert!(handle.is_loaded());

    let metadata = handle.metadata().unwrap();
    assert_eq!(metadata.run_id, summary.run_id);
    assert_eq!(metadata.n_features, 5);
}

#[test]
fn test_clear_cut_events_match_their_labels() {
    let dir = TempDir::new().unwrap();
    train_into(dir.path(), 400);
    let handle = ModelHandle::from_dir(dir.path().join("models"));

    let red = handle
        .predict(&Observation::new(8.8, 20.0, 8.0, 9.5, 1500.0))
        .unwrap();
    assert_eq!(red.alert, AlertLevel::Red);

    let green = handle
        .predict(&Observation::new(4.2, 300.0, 1.0, 1.5, 50.0))
        .unwrap();
    assert_eq!(green.alert, AlertLevel::Green);
    assert!(green.risk_score < red.risk_score);
}

#[test]
fn test_predict_without_artifacts() {
    let dir = TempDir::new().unwrap();
    let handle = ModelHandle::from_dir(dir.path());

    let err = predict_alert(&handle, 6.5, 50.0, 5.0, 5.0, 100.0).unwrap_err();
    assert!(matches!(err, AppError::ArtifactMissing(_)));
    assert_eq!(err.error_code(), "ARTIFACT_MISSING");
}

#[test]
fn test_artifacts_from_different_runs_are_rejected() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    train_into(first.path(), 200);
    train_into(second.path(), 200);

    std::fs::copy(
        second.path().join("models").join(ENCODER_FILE),
        first.path().join("models").join(ENCODER_FILE),
    )
    .unwrap();

    let handle = ModelHandle::from_dir(first.path().join("models"));
    let err = handle.load().unwrap_err();
    assert!(matches!(err, AppError::Artifact(_)));
}

#[test]
fn test_encoder_round_trip_from_disk() {
    let dir = TempDir::new().unwrap();
    train_into(dir.path(), 200);

    let (pipeline, encoder) = artifacts::load(&dir.path().join("models")).unwrap();
    assert_eq!(encoder.classes(), &["green", "orange", "red", "yellow"]);
    assert_eq!(pipeline.class_names(), encoder.classes());

    for level in AlertLevel::ALL {
        let code = encoder.encode(level.as_str()).unwrap();
        assert_eq!(encoder.decode(code).unwrap(), level.as_str());
    }
}

#[test]
fn test_schema_mismatch_is_detected_before_classification() {
    let dir = TempDir::new().unwrap();
    train_into(dir.path(), 200);
    let (pipeline, _) = artifacts::load(&dir.path().join("models")).unwrap();

    let err = pipeline
        .check_schema(&["magnitude", "depth", "cdi", "mmi"])
        .unwrap_err();
    assert!(matches!(err, AppError::SchemaMismatch { .. }));
    assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
}

#[test]
fn test_persisted_schema_mismatch_fails_prediction() {
    let dir = TempDir::new().unwrap();
    train_into(dir.path(), 200);
    let models = dir.path().join("models");
    let (pipeline, encoder) = artifacts::load(&models).unwrap();

    let renamed = ["magnitude", "depth_km", "cdi", "mmi", "sig"];
    let pipeline = pipeline.with_feature_names(renamed.iter().map(|s| s.to_string()).collect());
    let run_id = pipeline.metadata().run_id;
    artifacts::save(&models, &pipeline, &encoder, run_id).unwrap();

    let handle = ModelHandle::from_dir(&models);
    let err = predict_alert(&handle, 6.5, 50.0, 5.0, 5.0, 100.0).unwrap_err();
    assert!(matches!(err, AppError::SchemaMismatch { .. }));
    assert_eq!(err.error_code(), "SCHEMA_MISMATCH");
}

#[test]
fn test_training_fails_on_insufficient_class() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tiny.csv");
    std::fs::write(
        &path,
        "magnitude,depth,cdi,mmi,sig,alert\n\
         4.1,10,1,1,10,green\n4.2,11,1,1,10,green\n4.3,12,1,1,10,green\n\
         4.4,13,1,1,10,green\n4.5,14,1,1,10,green\n4.6,15,1,1,10,green\n\
         5.6,10,2,4,10,yellow\n5.7,11,2,4,10,yellow\n5.8,12,2,4,10,yellow\n\
         5.9,13,2,4,10,yellow\n6.0,14,2,4,10,yellow\n6.1,15,2,4,10,yellow\n\
         8.0,10,9,9,900,red\n",
    )
    .unwrap();

    let err = quick_trainer()
        .train_and_persist(&path, &dir.path().join("models"))
        .unwrap_err();
    assert!(matches!(err, AppError::TrainingInsufficiency { .. }));
    assert!(!dir.path().join("models").join(MODEL_FILE).exists());
}

#[test]
fn test_training_fails_without_label_column() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("unlabeled.csv");
    std::fs::write(&path, "magnitude,depth,cdi,mmi,sig\n5.0,10,3,4,100\n").unwrap();

    let err = quick_trainer()
        .train_and_persist(&path, &dir.path().join("models"))
        .unwrap_err();
    assert!(matches!(err, AppError::Data(_)));
}

#[test]
fn test_generated_dataset_is_reproducible_and_summarized() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.csv");
    let b = dir.path().join("b.csv");
    DatasetGenerator::new(1000, 42).write_csv(&a).unwrap();
    DatasetGenerator::new(1000, 42).write_csv(&b).unwrap();

    assert_eq!(
        std::fs::read_to_string(&a).unwrap(),
        std::fs::read_to_string(&b).unwrap()
    );

    let summary = DatasetSummary::from_table(&read_table(&a).unwrap()).unwrap();
    assert_eq!(summary.total, 1000);
    assert_eq!(
        summary.high_risk,
        summary.counts[&AlertLevel::Orange] + summary.counts[&AlertLevel::Red]
    );
    assert!(summary.most_common.is_some());
}
