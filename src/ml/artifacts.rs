//! Artifact persistence
//!
//! A training run produces two files in the artifacts directory: the fitted
//! pipeline (`best_model.bin`, bincode) and the label encoder
//! (`label_encoder.json`, JSON). Both carry the run id of the training run that
//! produced them; loading refuses a pair whose run ids or class lists differ.

use crate::error::{AppError, Result};
use crate::ml::classifier::{AlertPipeline, Classifier};
use crate::ml::preprocessing::LabelEncoder;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

pub const MODEL_FILE: &str = "best_model.bin";
pub const ENCODER_FILE: &str = "label_encoder.json";

/// Bumped whenever the persisted layout changes
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct PipelineArtifact {
    pub format_version: u32,
    pub run_id: Uuid,
    pub classes: Vec<String>,
    pub pipeline: AlertPipeline,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncoderArtifact {
    pub format_version: u32,
    pub run_id: Uuid,
    pub encoder: LabelEncoder,
}

/// Locations of the two artifacts inside a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub model: PathBuf,
    pub encoder: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            model: dir.join(MODEL_FILE),
            encoder: dir.join(ENCODER_FILE),
        }
    }
}

/// Persist a fitted pipeline and its encoder under `run_id`
pub fn save(
    dir: &Path,
    pipeline: &AlertPipeline,
    encoder: &LabelEncoder,
    run_id: Uuid,
) -> Result<ArtifactPaths> {
    if pipeline.class_names() != encoder.classes() {
        return Err(AppError::Internal(format!(
            "pipeline classes {:?} do not match encoder classes {:?}",
            pipeline.class_names(),
            encoder.classes()
        )));
    }

    fs::create_dir_all(dir)?;
    let paths = ArtifactPaths::in_dir(dir);

    let mut pipeline = pipeline.clone();
    pipeline.metadata_mut().run_id = run_id;

    let model = PipelineArtifact {
        format_version: FORMAT_VERSION,
        run_id,
        classes: encoder.classes().to_vec(),
        pipeline,
    };
    write_atomic(&paths.model, |writer| {
        bincode::serialize_into(writer, &model).map_err(AppError::from)
    })?;

    let encoder = EncoderArtifact {
        format_version: FORMAT_VERSION,
        run_id,
        encoder: encoder.clone(),
    };
    write_atomic(&paths.encoder, |writer| {
        serde_json::to_writer_pretty(writer, &encoder).map_err(AppError::from)
    })?;

    info!(
        run_id = %run_id,
        model = %paths.model.display(),
        encoder = %paths.encoder.display(),
        "Artifacts saved"
    );
    Ok(paths)
}

/// Write through a temporary sibling file, then rename over the target
fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = path.with_extension("tmp");
    let written = File::create(&tmp).map_err(AppError::from).and_then(|file| {
        let mut writer = BufWriter::new(file);
        write(&mut writer)?;
        writer.flush()?;
        Ok(())
    });

    match written.and_then(|()| fs::rename(&tmp, path).map_err(AppError::from)) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            Err(e)
        }
    }
}

/// Load and cross-check both artifacts from `dir`
pub fn load(dir: &Path) -> Result<(AlertPipeline, LabelEncoder)> {
    let paths = ArtifactPaths::in_dir(dir);

    for path in [&paths.model, &paths.encoder] {
        if !path.is_file() {
            return Err(AppError::ArtifactMissing(path.clone()));
        }
    }

    // Decoding from a slice bounds every length prefix by the bytes on disk
    let model: PipelineArtifact = {
        let bytes = fs::read(&paths.model)?;
        bincode::deserialize(&bytes).map_err(|e| {
            AppError::Artifact(format!("cannot decode {}: {}", paths.model.display(), e))
        })?
    };

    let encoder: EncoderArtifact = {
        let reader = BufReader::new(File::open(&paths.encoder)?);
        serde_json::from_reader(reader).map_err(|e| {
            AppError::Artifact(format!("cannot decode {}: {}", paths.encoder.display(), e))
        })?
    };

    verify(&model, &encoder)?;
    debug!(run_id = %model.run_id, dir = %dir.display(), "Artifacts loaded");

    Ok((model.pipeline, encoder.encoder))
}

/// Both artifacts must share format version, run id and class list
pub fn verify(model: &PipelineArtifact, encoder: &EncoderArtifact) -> Result<()> {
    for (name, version) in [(MODEL_FILE, model.format_version), (ENCODER_FILE, encoder.format_version)] {
        if version != FORMAT_VERSION {
            return Err(AppError::Artifact(format!(
                "{} has format version {}, expected {}",
                name, version, FORMAT_VERSION
            )));
        }
    }

    if model.run_id != encoder.run_id {
        return Err(AppError::Artifact(format!(
            "model (run {}) and label encoder (run {}) come from different training runs",
            model.run_id, encoder.run_id
        )));
    }

    if model.classes != encoder.encoder.classes() || model.pipeline.class_names() != model.classes {
        return Err(AppError::Artifact(format!(
            "model classes {:?} disagree with label encoder classes {:?}",
            model.classes,
            encoder.encoder.classes()
        )));
    }

    if !model.pipeline.is_trained() {
        return Err(AppError::Artifact("persisted pipeline is not trained".to_string()));
    }

    Ok(())
}
