//! Artifact bundle export.
//!
//! Layout of the output directory:
//! - `rf.<ext>` / `iforest.<ext>`: interchange documents (best effort)
//! - `metadata.json`: [`ModelMetadata`]
//! - `metrics.json`: [`MetricsReport`]
//! - `sample_data.csv`: leading generated records with their labels

use crate::error::{Result, TrainError};
use crate::explain::FeatureImportance;
use crate::feature_extractor::{FeatureExtractor, FEATURE_SPEC};
use crate::models::{InterchangeDocument, InterchangeWriter, TrainableScorer};
use crate::training::ScoreNormalization;
use crate::types::artifact::UNSUPERVISED_TYPE;
use crate::types::{ClaimRecord, Dataset, MetricsReport, ModelMetadata};
use chrono::Utc;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const METADATA_FILE: &str = "metadata.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const SAMPLE_FILE: &str = "sample_data.csv";
pub const CLASSIFIER_STEM: &str = "rf";
pub const DETECTOR_STEM: &str = "iforest";

/// `"v"` followed by the current UTC time as `YYYYMMDDHHMMSS`
pub fn model_version() -> String {
    Utc::now().format("v%Y%m%d%H%M%S").to_string()
}

/// Everything the bundle is assembled from
pub struct ExportInputs<'a> {
    pub dataset: &'a Dataset,
    pub classifier: &'a dyn TrainableScorer,
    pub detector: &'a dyn TrainableScorer,
    pub feature_means: Vec<f64>,
    pub feature_stds: Vec<f64>,
    pub importance: &'a FeatureImportance,
    pub detector_normalization: ScoreNormalization,
    pub metrics: &'a MetricsReport,
}

/// Files written by one export
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub output_dir: PathBuf,
    pub metadata: ModelMetadata,
    pub sample_rows: usize,
    pub removed_stale: usize,
}

/// Writes the artifact bundle into a single directory, replacing any previous run
pub struct ArtifactExporter<'a> {
    output_dir: PathBuf,
    sample_rows: usize,
    serializer: Option<&'a dyn InterchangeWriter>,
    extractor: FeatureExtractor,
}

impl<'a> ArtifactExporter<'a> {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        sample_rows: usize,
        serializer: Option<&'a dyn InterchangeWriter>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            sample_rows,
            serializer,
            extractor: FeatureExtractor::new(),
        }
    }

    pub fn export(&self, inputs: &ExportInputs<'_>) -> Result<ExportReport> {
        // Model paths are filled in after the contract check so a violation writes nothing
        let mut metadata = ModelMetadata {
            model_version: model_version(),
            rf_model_path: None,
            unsup_model_path: None,
            unsupervised_type: UNSUPERVISED_TYPE.to_string(),
            feature_spec: self.extractor.feature_names(),
            feature_means: inputs.feature_means.clone(),
            feature_stds: inputs.feature_stds.clone(),
            shap_importance: inputs.importance.weights.clone(),
            if_mean: inputs.detector_normalization.mean,
            if_std: inputs.detector_normalization.std,
        };
        metadata.validate()?;

        fs::create_dir_all(&self.output_dir)?;
        let removed_stale = self.remove_stale()?;

        metadata.rf_model_path = self.export_model(inputs.classifier, CLASSIFIER_STEM);
        metadata.unsup_model_path = self.export_model(inputs.detector, DETECTOR_STEM);

        let metadata_path = self.output_dir.join(METADATA_FILE);
        write_json(&metadata_path, &metadata)?;
        info!(path = %metadata_path.display(), version = %metadata.model_version, "Saved metadata");

        let sample = inputs.dataset.head(self.sample_rows);
        let sample_path = self.output_dir.join(SAMPLE_FILE);
        self.write_sample_csv(&sample_path, sample)?;
        info!(path = %sample_path.display(), rows = sample.len(), "Saved sample");

        let metrics_path = self.output_dir.join(METRICS_FILE);
        write_json(&metrics_path, inputs.metrics)?;
        info!(path = %metrics_path.display(), "Saved metrics");

        let written = read_metadata(&metadata_path)?;
        written.validate()?;

        Ok(ExportReport {
            output_dir: self.output_dir.clone(),
            metadata: written,
            sample_rows: sample.len(),
            removed_stale,
        })
    }

    /// Remove artifacts of a previous run so a degraded export never leaves an old model behind
    fn remove_stale(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.output_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let stale = [METADATA_FILE, METRICS_FILE, SAMPLE_FILE].contains(&name)
                || name.starts_with(&format!("{}.", CLASSIFIER_STEM))
                || name.starts_with(&format!("{}.", DETECTOR_STEM));
            if stale {
                fs::remove_file(&path)?;
                debug!(path = %path.display(), "Removed stale artifact");
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Serialize one model; the returned file name is `None` unless the file was written
    fn export_model(&self, model: &dyn TrainableScorer, stem: &str) -> Option<String> {
        let Some(serializer) = self.serializer else {
            warn!(model = model.name(), "No interchange serializer, skipping model export");
            return None;
        };

        let file_name = format!("{}.{}", stem, serializer.extension());
        let path = self.output_dir.join(&file_name);

        let result = model
            .to_interchange()
            .map(|m| InterchangeDocument::new(self.extractor.feature_names(), m))
            .and_then(|doc| serializer.write(&doc, &path));

        match result {
            Ok(()) if path.is_file() => {
                info!(model = model.name(), path = %path.display(), "Saved model");
                Some(file_name)
            }
            Ok(()) => {
                warn!(
                    model = model.name(),
                    path = %path.display(),
                    "Model file missing after export"
                );
                None
            }
            Err(e) => {
                warn!(model = model.name(), error = %e, "Model export failed");
                // Do not leave a partial file that metadata does not reference
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    /// Header: schema names then `label`
    fn write_sample_csv(&self, path: &Path, records: &[ClaimRecord]) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{},label", FEATURE_SPEC.join(","))?;
        for record in records {
            let values: Vec<String> = self
                .extractor
                .extract_f64(record)
                .iter()
                .map(|v| v.to_string())
                .collect();
            writeln!(writer, "{},{}", values.join(","), record.label)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

fn read_metadata(path: &Path) -> Result<ModelMetadata> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(TrainError::from)
}
