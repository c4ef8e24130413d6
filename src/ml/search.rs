//! Hyperparameter search
//!
//! Exhaustive grid search scored by stratified k-fold cross-validation. Every
//! (candidate, fold) fit runs as an independent task on a dedicated rayon pool;
//! the candidate with the highest mean weighted F1 wins, earlier candidates
//! winning ties.

use crate::config::GridConfig;
use crate::error::{AppError, Result};
use crate::ml::classifier::Classifier;
use crate::ml::forest::ForestParams;
use crate::ml::metrics::weighted_f1;
use crate::ml::models::TrainingDataset;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info};

/// Hyperparameter grid for the forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_split: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![200, 300, 400],
            max_depth: vec![Some(10), Some(15), None],
            min_samples_split: vec![2, 5, 10],
        }
    }
}

impl From<&GridConfig> for ParamGrid {
    fn from(config: &GridConfig) -> Self {
        Self {
            n_estimators: config.n_estimators.clone(),
            max_depth: config
                .max_depth
                .iter()
                .map(|&d| if d == 0 { None } else { Some(d) })
                .collect(),
            min_samples_split: config.min_samples_split.clone(),
        }
    }
}

impl ParamGrid {
    /// Small grid for smoke runs
    pub fn quick() -> Self {
        Self {
            n_estimators: vec![50],
            max_depth: vec![Some(10), None],
            min_samples_split: vec![2],
        }
    }

    /// All combinations; `max_depth` varies slowest, `n_estimators` fastest
    pub fn candidates(&self, seed: u64) -> Vec<ForestParams> {
        let mut candidates = Vec::with_capacity(self.len());
        for &max_depth in &self.max_depth {
            for &min_samples_split in &self.min_samples_split {
                for &n_estimators in &self.n_estimators {
                    candidates.push(ForestParams {
                        n_estimators,
                        max_depth,
                        min_samples_split,
                        seed,
                    });
                }
            }
        }
        candidates
    }

    pub fn len(&self) -> usize {
        self.n_estimators.len() * self.max_depth.len() * self.min_samples_split.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Row indices of one cross-validation fold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

/// Stratified k-fold splitter without shuffling.
///
/// Every class is spread over the folds so that class proportions in each
/// validation fold match the whole set as closely as possible.
#[derive(Debug, Clone, Copy)]
pub struct StratifiedKFold {
    n_splits: usize,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Result<Self> {
        if n_splits < 2 {
            return Err(AppError::Configuration(format!(
                "cross-validation needs at least 2 folds, got {}",
                n_splits
            )));
        }
        Ok(Self { n_splits })
    }

    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Every class in `class_names` must have at least `n_splits` samples
    pub fn check_class_counts(&self, labels: &[usize], class_names: &[String]) -> Result<()> {
        let mut counts = vec![0usize; class_names.len()];
        for &label in labels {
            if label < counts.len() {
                counts[label] += 1;
            }
        }

        for (class, &count) in class_names.iter().zip(&counts) {
            if count < self.n_splits {
                return Err(AppError::TrainingInsufficiency {
                    class: class.clone(),
                    count,
                    required: self.n_splits,
                });
            }
        }
        Ok(())
    }

    pub fn split(&self, labels: &[usize]) -> Vec<Fold> {
        let k = self.n_splits;
        let n_classes = labels.iter().copied().max().map_or(0, |m| m + 1);

        // Deal the label-sorted rows round robin to find each fold's share of
        // every class
        let mut sorted = labels.to_vec();
        sorted.sort_unstable();
        let mut allocation = vec![vec![0usize; n_classes]; k];
        for (i, &label) in sorted.iter().enumerate() {
            allocation[i % k][label] += 1;
        }

        let mut fold_of = vec![0usize; labels.len()];
        for class in 0..n_classes {
            let members = labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == class)
                .map(|(i, _)| i);

            let mut fold = 0;
            let mut taken = 0;
            for row in members {
                while fold < k && taken >= allocation[fold][class] {
                    fold += 1;
                    taken = 0;
                }
                fold_of[row] = fold.min(k - 1);
                taken += 1;
            }
        }

        (0..k)
            .map(|fold| {
                let (validation, train): (Vec<usize>, Vec<usize>) =
                    (0..labels.len()).partition(|&row| fold_of[row] == fold);
                Fold { train, validation }
            })
            .collect()
    }
}

/// Cross-validation result of a single candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub params: ForestParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
}

/// Result of a grid search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub best_params: ForestParams,
    pub best_score: f64,
    pub best_index: usize,
    pub results: Vec<CandidateScore>,
}

/// Grid search executor
pub struct GridSearch {
    pool: ThreadPool,
    kfold: StratifiedKFold,
}

impl GridSearch {
    /// `n_jobs == 0` uses one worker per available core
    pub fn new(n_jobs: usize, cv_folds: usize) -> Result<Self> {
        let kfold = StratifiedKFold::new(cv_folds)?;
        let pool = ThreadPoolBuilder::new()
            .num_threads(n_jobs)
            .thread_name(|i| format!("quake-search-{}", i))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to build worker pool: {}", e)))?;

        Ok(Self { pool, kfold })
    }

    pub fn n_workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run a closure on the search's worker pool
    pub fn install<R, F>(&self, f: F) -> R
    where
        R: Send,
        F: FnOnce() -> R + Send,
    {
        self.pool.install(f)
    }

    /// Score every grid candidate by cross-validation.
    ///
    /// Fails with `TrainingInsufficiency` before any model is fitted when a
    /// class has fewer samples than there are folds.
    pub fn run<C, F>(
        &self,
        dataset: &TrainingDataset,
        class_names: &[String],
        grid: &ParamGrid,
        seed: u64,
        factory: F,
    ) -> Result<SearchOutcome>
    where
        C: Classifier,
        F: Fn(ForestParams) -> C + Sync,
    {
        let candidates = grid.candidates(seed);
        if candidates.is_empty() {
            return Err(AppError::Configuration(
                "hyperparameter grid has no candidates".to_string(),
            ));
        }

        self.kfold.check_class_counts(&dataset.labels, class_names)?;

        let folds: Vec<(TrainingDataset, TrainingDataset)> = self
            .kfold
            .split(&dataset.labels)
            .iter()
            .map(|fold| (dataset.subset(&fold.train), dataset.subset(&fold.validation)))
            .collect();

        let n_folds = folds.len();
        let total = candidates.len() * n_folds;
        info!(
            "Fitting {} folds for each of {} candidates, totalling {} fits",
            n_folds,
            candidates.len(),
            total
        );

        let tasks: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..n_folds).map(move |f| (c, f)))
            .collect();
        let completed = AtomicUsize::new(0);
        let candidates_done = AtomicUsize::new(0);
        let progress = CandidateProgress::new(candidates.len(), n_folds);
        let n_classes = class_names.len();

        self.pool.install(|| {
            tasks
                .par_iter()
                .map(|&(c, f)| {
                    let (train, validation) = &folds[f];
                    let mut model = factory(candidates[c]);
                    model.train(train)?;
                    let predictions = model.predict(&validation.features)?;
                    let score = weighted_f1(&validation.labels, &predictions, n_classes);

                    let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                    debug!(
                        candidate = c,
                        fold = f,
                        score,
                        "[CV {}/{}] {}",
                        done,
                        total,
                        candidates[c]
                    );

                    if let Some(fold_scores) = progress.record(c, f, score) {
                        let (mean_score, std_score) = mean_std(&fold_scores);
                        let finished = candidates_done.fetch_add(1, Ordering::Relaxed) + 1;
                        info!(
                            candidate = c,
                            mean_score,
                            std_score,
                            "Candidate {}/{} scored: {}",
                            finished,
                            candidates.len(),
                            candidates[c]
                        );
                    }
                    Ok(())
                })
                .collect::<Result<()>>()
        })?;

        let fold_scores = progress.into_fold_scores();

        let results: Vec<CandidateScore> = candidates
            .iter()
            .zip(fold_scores)
            .map(|(params, fold_scores)| {
                let (mean_score, std_score) = mean_std(&fold_scores);
                CandidateScore {
                    params: *params,
                    fold_scores,
                    mean_score,
                    std_score,
                }
            })
            .collect();

        let mut best_index = 0;
        for (i, result) in results.iter().enumerate().skip(1) {
            if result.mean_score > results[best_index].mean_score {
                best_index = i;
            }
        }

        let best = &results[best_index];
        info!(
            params = %best.params,
            score = best.mean_score,
            "Best hyperparameters selected"
        );

        Ok(SearchOutcome {
            best_params: best.params,
            best_score: best.mean_score,
            best_index,
            results,
        })
    }
}

/// Fold scores of every candidate, filled in by concurrent fits
struct CandidateProgress {
    scores: Vec<Vec<AtomicU64>>,
    finished: Vec<AtomicUsize>,
}

impl CandidateProgress {
    fn new(n_candidates: usize, n_folds: usize) -> Self {
        Self {
            scores: (0..n_candidates)
                .map(|_| (0..n_folds).map(|_| AtomicU64::new(0)).collect())
                .collect(),
            finished: (0..n_candidates).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    /// Store one fold score. Returns the candidate's fold scores once its last fold is in.
    fn record(&self, candidate: usize, fold: usize, score: f64) -> Option<Vec<f64>> {
        self.scores[candidate][fold].store(score.to_bits(), Ordering::Relaxed);
        let done = self.finished[candidate].fetch_add(1, Ordering::AcqRel) + 1;
        (done == self.scores[candidate].len()).then(|| Self::load(&self.scores[candidate]))
    }

    fn into_fold_scores(self) -> Vec<Vec<f64>> {
        self.scores.iter().map(|folds| Self::load(folds)).collect()
    }

    fn load(folds: &[AtomicU64]) -> Vec<f64> {
        folds
            .iter()
            .map(|bits| f64::from_bits(bits.load(Ordering::Relaxed)))
            .collect()
    }
}

/// Mean and population standard deviation
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}
