use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Dataset and artifact locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Synthetic dataset generation
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Model training and hyperparameter search
    #[serde(default)]
    pub training: TrainingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default file location and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file (if given) over the embedded defaults
    pub fn load_from(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let config_path = path
            .map(|p| p.to_string_lossy().into_owned())
            .or_else(|| std::env::var("QUAKE_ALERT_CONFIG").ok())
            .unwrap_or_else(|| "config/quake-alert.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (QUAKE_ALERT__TRAINING__CV_FOLDS=3)
            .add_source(environment())
            .build()?
            .try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("QUAKE_ALERT")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// CSV dataset used for training
    #[serde(default = "default_dataset_path")]
    pub dataset: PathBuf,

    /// Directory holding the model and label encoder artifacts
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            dataset: default_dataset_path(),
            artifacts_dir: default_artifacts_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of rows to generate
    #[serde(default = "default_rows")]
    pub rows: usize,

    /// Random seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            seed: default_seed(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed for the train/test split and the forest
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of cross-validation folds
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    /// Preserve class proportions in the train/test split
    #[serde(default = "default_true")]
    pub stratify: bool,

    /// Worker threads for the search (0 = all available cores)
    #[serde(default)]
    pub n_jobs: usize,

    /// Hyperparameter grid
    #[serde(default)]
    pub grid: GridConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            seed: default_seed(),
            cv_folds: default_cv_folds(),
            stratify: true,
            n_jobs: 0,
            grid: GridConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Tree counts to try
    #[serde(default = "default_n_estimators")]
    pub n_estimators: Vec<usize>,

    /// Maximum depths to try (0 = unbounded)
    #[serde(default = "default_max_depth")]
    pub max_depth: Vec<usize>,

    /// Minimum samples required to split a node
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: Vec<usize>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

// Default value functions
fn default_dataset_path() -> PathBuf {
    PathBuf::from("data/usgs_earthquake_realistic_1000.csv")
}

fn default_artifacts_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_rows() -> usize {
    1000
}

fn default_seed() -> u64 {
    42
}

fn default_test_size() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    5
}

fn default_true() -> bool {
    true
}

fn default_n_estimators() -> Vec<usize> {
    vec![200, 300, 400]
}

fn default_max_depth() -> Vec<usize> {
    vec![10, 15, 0]
}

fn default_min_samples_split() -> Vec<usize> {
    vec![2, 5, 10]
}

fn default_log_level() -> String {
    "info".to_string()
}
