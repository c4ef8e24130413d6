//! Random forest classifier
//!
//! Bagged CART trees with the Gini criterion and balanced class weights.
//! Each tree trains on a bootstrap sample; at every node a random subset of
//! `floor(sqrt(n_features))` features is searched for the best threshold.
//! Class probabilities are the mean of the per-tree leaf distributions.

use crate::error::{AppError, Result};
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Forest hyperparameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForestParams {
    /// Number of trees
    pub n_estimators: usize,

    /// Maximum tree depth; `None` grows until leaves are pure
    pub max_depth: Option<usize>,

    /// Minimum number of bootstrap draws a node needs to be split
    pub min_samples_split: usize,

    /// Seed for bootstrap sampling and feature selection
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            seed: 42,
        }
    }
}

impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = match self.max_depth {
            Some(d) => d.to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "n_estimators={}, max_depth={}, min_samples_split={}",
            self.n_estimators, depth, self.min_samples_split
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Training sample inside a tree: row index, class weight times bootstrap
/// multiplicity, and the multiplicity itself
#[derive(Debug, Clone, Copy)]
struct Sample {
    row: usize,
    weight: f64,
    draws: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    improvement: f64,
}

/// Single CART tree stored as a flat arena; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    n_classes: usize,
}

impl DecisionTree {
    fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        samples: Vec<Sample>,
        n_classes: usize,
        max_features: usize,
        params: &ForestParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = vec![Node::Leaf {
            distribution: Vec::new(),
        }];
        let mut stack = vec![(0usize, samples, 0usize)];

        while let Some((node_id, samples, depth)) = stack.pop() {
            let counts = weighted_counts(&samples, y, n_classes);
            let draws: usize = samples.iter().map(|s| s.draws).sum();
            let occupied = counts.iter().filter(|&&w| w > 0.0).count();

            let depth_reached = params.max_depth.map_or(false, |max| depth >= max);
            let splittable = !depth_reached && draws >= params.min_samples_split && occupied > 1;

            let split = if splittable {
                best_split(x, y, &samples, &counts, n_classes, max_features, rng)
            } else {
                None
            };

            match split {
                Some(split) => {
                    let (left_samples, right_samples): (Vec<Sample>, Vec<Sample>) = samples
                        .into_iter()
                        .partition(|s| x[[s.row, split.feature]] <= split.threshold);

                    let left = nodes.len();
                    let right = left + 1;
                    nodes.push(Node::Leaf {
                        distribution: Vec::new(),
                    });
                    nodes.push(Node::Leaf {
                        distribution: Vec::new(),
                    });
                    nodes[node_id] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left,
                        right,
                    };

                    stack.push((right, right_samples, depth + 1));
                    stack.push((left, left_samples, depth + 1));
                }
                None => {
                    nodes[node_id] = Node::Leaf {
                        distribution: normalize(counts),
                    };
                }
            }
        }

        Self { nodes, n_classes }
    }

    /// Class distribution of the leaf a row falls into
    pub fn predict_row(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            match &self.nodes[idx] {
                Node::Leaf { .. } => max_depth = max_depth.max(depth),
                Node::Split { left, right, .. } => {
                    stack.push((*left, depth + 1));
                    stack.push((*right, depth + 1));
                }
            }
        }
        max_depth
    }
}

fn weighted_counts(samples: &[Sample], y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0.0; n_classes];
    for s in samples {
        counts[y[s.row]] += s.weight;
    }
    counts
}

fn normalize(counts: Vec<f64>) -> Vec<f64> {
    let total: f64 = counts.iter().sum();
    if total <= 0.0 {
        let uniform = 1.0 / counts.len() as f64;
        return vec![uniform; counts.len()];
    }
    counts.into_iter().map(|c| c / total).collect()
}

/// Weighted Gini impurity scaled by total weight: `W * (1 - sum(p_c^2))`
fn weighted_gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    let sum_sq: f64 = counts.iter().map(|c| c * c).sum();
    total - sum_sq / total
}

fn best_split(
    x: ArrayView2<f64>,
    y: &[usize],
    samples: &[Sample],
    counts: &[f64],
    n_classes: usize,
    max_features: usize,
    rng: &mut StdRng,
) -> Option<BestSplit> {
    let total: f64 = counts.iter().sum();
    let parent = weighted_gini(counts, total);

    let mut features: Vec<usize> = (0..x.ncols()).collect();
    features.shuffle(rng);

    let mut best: Option<BestSplit> = None;
    let mut visited = 0;
    let mut column: Vec<(f64, usize, f64)> = Vec::with_capacity(samples.len());

    for feature in features {
        if visited >= max_features {
            break;
        }

        column.clear();
        column.extend(samples.iter().map(|s| (x[[s.row, feature]], y[s.row], s.weight)));
        column.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Constant features do not count towards max_features
        let (first, last) = (column[0].0, column[column.len() - 1].0);
        if first >= last {
            continue;
        }
        visited += 1;

        let mut left = vec![0.0; n_classes];
        let mut left_total = 0.0;

        for i in 0..column.len() - 1 {
            let (value, label, weight) = column[i];
            left[label] += weight;
            left_total += weight;

            let next = column[i + 1].0;
            if value >= next {
                continue;
            }

            let right: Vec<f64> = counts.iter().zip(&left).map(|(c, l)| c - l).collect();
            let right_total = total - left_total;
            let improvement =
                parent - weighted_gini(&left, left_total) - weighted_gini(&right, right_total);

            if best.as_ref().map_or(true, |b| improvement > b.improvement) {
                let mut threshold = (value + next) / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                best = Some(BestSplit {
                    feature,
                    threshold,
                    improvement,
                });
            }
        }
    }

    best
}

/// Ensemble of decision trees
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_classes: usize,
    n_features: usize,
    params: ForestParams,
}

impl RandomForest {
    /// Fit a forest on `x` (n_samples × n_features) and class codes `y`.
    /// Trees are built in parallel on the current rayon pool.
    pub fn fit(x: ArrayView2<f64>, y: &[usize], n_classes: usize, params: ForestParams) -> Result<Self> {
        let (n_samples, n_features) = x.dim();

        if n_samples == 0 || n_features == 0 {
            return Err(AppError::Data("cannot fit a forest on an empty matrix".to_string()));
        }
        if y.len() != n_samples {
            return Err(AppError::Internal(format!(
                "{} labels for {} samples",
                y.len(),
                n_samples
            )));
        }
        if let Some(&bad) = y.iter().find(|&&label| label >= n_classes) {
            return Err(AppError::Internal(format!(
                "class code {} out of range for {} classes",
                bad, n_classes
            )));
        }
        if params.n_estimators == 0 {
            return Err(AppError::Configuration("n_estimators must be at least 1".to_string()));
        }
        if params.min_samples_split < 2 {
            return Err(AppError::Configuration(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if params.max_depth == Some(0) {
            return Err(AppError::Configuration("max_depth must be at least 1".to_string()));
        }

        let class_weights = balanced_class_weights(y, n_classes);
        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);

        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(tree_seed(params.seed, index));
                let samples = bootstrap(n_samples, y, &class_weights, &mut rng);
                DecisionTree::fit(x, y, samples, n_classes, max_features, &params, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            n_classes,
            n_features,
            params,
        })
    }

    /// Mean leaf distribution over all trees for one row
    pub fn predict_proba_row(&self, row: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, leaf) in proba.iter_mut().zip(tree.predict_row(row)) {
                *p += leaf;
            }
        }
        let n_trees = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n_trees);
        proba
    }

    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;

        let mut proba = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let row: Vec<f64> = row.to_vec();
            for (j, p) in self.predict_proba_row(&row).into_iter().enumerate() {
                proba[[i, j]] = p;
            }
        }
        Ok(proba)
    }

    /// Most probable class per row; ties go to the lowest class code
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|row| argmax(&row.to_vec()))
            .collect())
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features {
            return Err(AppError::Internal(format!(
                "forest was trained on {} features, got {}",
                self.n_features, width
            )));
        }
        Ok(())
    }
}

/// Index of the largest value; the first maximum wins
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// `n / (k * n_c)` where `k` counts classes actually present
fn balanced_class_weights(y: &[usize], n_classes: usize) -> Vec<f64> {
    let mut counts = vec![0usize; n_classes];
    for &label in y {
        counts[label] += 1;
    }
    let present = counts.iter().filter(|&&c| c > 0).count() as f64;
    let n = y.len() as f64;
    counts
        .iter()
        .map(|&c| if c == 0 { 0.0 } else { n / (present * c as f64) })
        .collect()
}

fn bootstrap(n_samples: usize, y: &[usize], class_weights: &[f64], rng: &mut StdRng) -> Vec<Sample> {
    let mut draws = vec![0usize; n_samples];
    for _ in 0..n_samples {
        draws[rng.gen_range(0..n_samples)] += 1;
    }
    draws
        .into_iter()
        .enumerate()
        .filter(|(_, d)| *d > 0)
        .map(|(row, d)| Sample {
            row,
            weight: class_weights[y[row]] * d as f64,
            draws: d,
        })
        .collect()
}

fn tree_seed(seed: u64, index: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .wrapping_add((index as u64).wrapping_mul(0xBF58_476D_1CE4_E5B9))
        .wrapping_add(1)
}
