use crate::config::TrainingConfig;
use crate::dataset::io::{read_table, RawTable};
use crate::error::Result;
use crate::ml::artifacts::{self, ArtifactPaths};
use crate::ml::classifier::{AlertPipeline, Classifier};
use crate::ml::forest::ForestParams;
use crate::ml::metrics::{calculate_metrics, classification_report};
use crate::ml::models::{ModelMetrics, TrainingDataset};
use crate::ml::preprocessing::{prepare, train_test_split, LabelEncoder};
use crate::ml::search::{CandidateScore, GridSearch, ParamGrid};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

/// Report of a completed training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Identifier shared by both persisted artifacts
    pub run_id: Uuid,

    /// Selected hyperparameters
    pub best_params: ForestParams,

    /// Mean cross-validated weighted F1 of the selected hyperparameters
    pub best_cv_score: f64,

    /// Metrics on the held-out test split
    pub test_metrics: ModelMetrics,

    /// Per-class precision/recall/F1 table for the test split
    pub report: String,

    pub n_train: usize,
    pub n_test: usize,

    /// Cross-validation results of every grid candidate, in grid order
    pub candidates: Vec<CandidateScore>,

    /// Where the artifacts were written, if they were
    #[serde(default)]
    pub artifacts: Option<PathSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSummary {
    pub model: String,
    pub encoder: String,
}

impl From<&ArtifactPaths> for PathSummary {
    fn from(paths: &ArtifactPaths) -> Self {
        Self {
            model: paths.model.display().to_string(),
            encoder: paths.encoder.display().to_string(),
        }
    }
}

/// Fitted pipeline, its encoder and the run report
#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub pipeline: AlertPipeline,
    pub encoder: LabelEncoder,
    pub summary: TrainingSummary,
}

/// Offline trainer: split, grid search, refit and evaluation
pub struct ModelTrainer {
    config: TrainingConfig,
    grid: ParamGrid,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        let grid = ParamGrid::from(&config.grid);
        Self { config, grid }
    }

    /// Replace the configured hyperparameter grid
    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Train on a raw table without touching the filesystem
    pub fn fit(&self, table: &RawTable) -> Result<TrainedModel> {
        let started = Instant::now();

        let prepared = prepare(table)?;
        let labels: Vec<&str> = prepared.labels.iter().map(|l| l.as_str()).collect();
        let mut encoder = LabelEncoder::new();
        let codes = encoder.fit_transform(&labels)?;
        let classes = encoder.classes().to_vec();
        let feature_names = prepared.feature_names;

        let dataset = TrainingDataset::new(prepared.features, codes)?;
        let split = train_test_split(
            &dataset.labels,
            self.config.test_size,
            self.config.seed,
            self.config.stratify,
        )?;
        let train_set = dataset.subset(&split.train);
        let test_set = dataset.subset(&split.test);

        info!(
            rows = dataset.n_samples,
            train = train_set.n_samples,
            test = test_set.n_samples,
            classes = ?classes,
            "Dataset prepared"
        );

        let search = GridSearch::new(self.config.n_jobs, self.config.cv_folds)?;
        info!(
            candidates = self.grid.len(),
            folds = self.config.cv_folds,
            workers = search.n_workers(),
            "Starting hyperparameter search"
        );
        let outcome = search.run(&train_set, &classes, &self.grid, self.config.seed, |params| {
            AlertPipeline::new(params, classes.clone()).with_feature_names(feature_names.clone())
        })?;

        // Refit the winner on the whole training split
        let mut pipeline = AlertPipeline::new(outcome.best_params, classes.clone())
            .with_feature_names(feature_names);
        search.install(|| pipeline.train(&train_set))?;

        let predictions = pipeline.predict(&test_set.features)?;
        let test_metrics = calculate_metrics(&test_set.labels, &predictions, &classes);
        let report = classification_report(&test_metrics);

        let run_id = Uuid::new_v4();
        let metadata = pipeline.metadata_mut();
        metadata.run_id = run_id;
        metadata.cv_score = Some(outcome.best_score);
        metadata.validation_metrics = Some(test_metrics.clone());

        info!(
            run_id = %run_id,
            params = %outcome.best_params,
            cv_f1 = outcome.best_score,
            accuracy = test_metrics.accuracy,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Training complete - test accuracy: {:.2}%",
            test_metrics.accuracy * 100.0
        );
        info!("Classification report:\n{}", report);

        let summary = TrainingSummary {
            run_id,
            best_params: outcome.best_params,
            best_cv_score: outcome.best_score,
            test_metrics,
            report,
            n_train: train_set.n_samples,
            n_test: test_set.n_samples,
            candidates: outcome.results,
            artifacts: None,
        };

        Ok(TrainedModel {
            pipeline,
            encoder,
            summary,
        })
    }

    /// Read a dataset, train on it and write both artifacts into `artifacts_dir`
    pub fn train_and_persist(&self, dataset_path: &Path, artifacts_dir: &Path) -> Result<TrainingSummary> {
        info!(dataset = %dataset_path.display(), "Loading dataset");
        let table = read_table(dataset_path)?;

        let trained = self.fit(&table)?;
        let paths = artifacts::save(
            artifacts_dir,
            &trained.pipeline,
            &trained.encoder,
            trained.summary.run_id,
        )?;

        let mut summary = trained.summary;
        summary.artifacts = Some(PathSummary::from(&paths));
        Ok(summary)
    }
}
