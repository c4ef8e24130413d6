use std::path::PathBuf;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed or missing dataset, columns or cells
    #[error("Data error: {0}")]
    Data(String),

    /// A persisted model or label encoder could not be located
    #[error("Artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// A persisted model or label encoder is corrupt or inconsistent
    #[error("Artifact error: {0}")]
    Artifact(String),

    /// Feature set at inference differs from the one used for training
    #[error("Schema mismatch: model was trained on {expected:?}, inference provides {actual:?}")]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    /// A class has too few samples for the requested cross-validation
    #[error(
        "Insufficient training data: class '{class}' has {count} sample(s), \
         {required}-fold cross-validation needs at least {required}"
    )]
    TrainingInsufficiency {
        class: String,
        count: usize,
        required: usize,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Data(_) => "DATA_ERROR",
            AppError::ArtifactMissing(_) => "ARTIFACT_MISSING",
            AppError::Artifact(_) => "ARTIFACT_ERROR",
            AppError::SchemaMismatch { .. } => "SCHEMA_MISMATCH",
            AppError::TrainingInsufficiency { .. } => "TRAINING_INSUFFICIENCY",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get process exit code for this error (sysexits.h values)
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Data(_) => 65,
            AppError::TrainingInsufficiency { .. } => 65,
            AppError::Validation(_) => 64,
            AppError::ArtifactMissing(_) => 66,
            AppError::Artifact(_) => 66,
            AppError::SchemaMismatch { .. } => 65,
            AppError::Configuration(_) => 78,
            AppError::Io(_) => 74,
            AppError::Serialization(_) => 70,
            AppError::Internal(_) => 70,
        }
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from bincode::Error
impl From<bincode::Error> for AppError {
    fn from(err: bincode::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;
