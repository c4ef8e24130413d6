//! Earthquake alert-level classification.
//!
//! Classifies seismic events into green/yellow/orange/red alert levels from
//! five numeric attributes (magnitude, depth, CDI, MMI, significance) using a
//! random forest, and enriches every prediction with a heuristic risk score and
//! an aftershock probability.
//!
//! ```no_run
//! use quake_alert::{predict_alert, ModelHandle};
//!
//! let handle = ModelHandle::from_dir("models");
//! let (alert, risk, confidence, aftershock) =
//!     predict_alert(&handle, 6.5, 50.0, 5.0, 5.0, 100.0)?;
//! println!("{alert}: risk {risk}, confidence {confidence}%, aftershock {aftershock}%");
//! # Ok::<(), quake_alert::AppError>(())
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod ml;
pub mod models;

pub use config::Config;
pub use error::{AppError, Result};
pub use ml::{predict_alert, ModelHandle, ModelTrainer, PredictionResult};
pub use models::{AlertLevel, Observation};
