//! Artifact Bundle Inspector
//!
//! Loads a bundle written by the trainer, validates the metadata contract,
//! reloads the recorded model documents and scores the sample rows the way a
//! serving consumer would.

use anyhow::{bail, Context, Result};
use claim_fraud_trainer::exporter::{METADATA_FILE, METRICS_FILE, SAMPLE_FILE};
use claim_fraud_trainer::models::interchange::{read_document, InterchangeDocument};
use claim_fraud_trainer::types::{MetricsReport, ModelMetadata};
use ndarray::Array1;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Rows of the sample file scored in the report
const PREVIEW_ROWS: usize = 5;

fn load_model(dir: &Path, file: Option<&str>, label: &str) -> Result<Option<InterchangeDocument>> {
    let Some(file) = file else {
        warn!(model = label, "Model path is null in metadata (export was degraded)");
        return Ok(None);
    };
    let document = read_document(&dir.join(file))
        .with_context(|| format!("Failed to load {} model from {}", label, file))?;
    info!(
        model = label,
        file,
        trees = document.model.trees().len(),
        "Model document loaded"
    );
    Ok(Some(document))
}

/// Parse the sample CSV into feature rows, checking the header against the schema
fn load_sample(path: &Path, metadata: &ModelMetadata) -> Result<Vec<(Array1<f32>, u8)>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let mut lines = raw.lines();

    let header: Vec<&str> = lines.next().unwrap_or_default().split(',').collect();
    let n = metadata.feature_spec.len();
    if header.len() != n + 1 || header[..n] != metadata.feature_spec[..] || header[n] != "label" {
        bail!("Sample header does not match feature_spec");
    }

    lines
        .enumerate()
        .map(|(i, line)| {
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() != n + 1 {
                bail!("Sample row {} has {} fields", i + 1, fields.len());
            }
            let features = fields[..n]
                .iter()
                .map(|f| f.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .with_context(|| format!("Invalid value in sample row {}", i + 1))?;
            let label = fields[n]
                .parse::<u8>()
                .with_context(|| format!("Invalid label in sample row {}", i + 1))?;
            Ok((Array1::from(features), label))
        })
        .collect()
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inspect_bundle=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let dir = PathBuf::from(args.get(1).map(|s| s.as_str()).unwrap_or("models"));
    info!(dir = %dir.display(), "Inspecting artifact bundle");

    let metadata = ModelMetadata::load(&dir.join(METADATA_FILE))?;
    info!(version = %metadata.model_version, "Metadata contract valid");

    let metrics: MetricsReport = serde_json::from_str(
        &fs::read_to_string(dir.join(METRICS_FILE)).context("Failed to read metrics")?,
    )
    .context("Failed to parse metrics")?;

    let rf = load_model(&dir, metadata.rf_model_path.as_deref(), "rf")?;
    let iforest = load_model(&dir, metadata.unsup_model_path.as_deref(), "iforest")?;
    for document in rf.iter().chain(iforest.iter()) {
        if document.feature_names != metadata.feature_spec {
            bail!("Model feature order differs from metadata feature_spec");
        }
    }

    let sample = load_sample(&dir.join(SAMPLE_FILE), &metadata)?;

    println!("Bundle {}", metadata.model_version);
    println!("  directory:      {}", dir.display());
    println!("  rf model:       {}", metadata.rf_model_path.as_deref().unwrap_or("null"));
    println!("  iforest model:  {}", metadata.unsup_model_path.as_deref().unwrap_or("null"));
    println!("  sample rows:    {}", sample.len());
    println!(
        "  detector norm:  mean={:.6} std={:.6} (raw score, higher = more normal)",
        metadata.if_mean, metadata.if_std
    );
    println!(
        "  roc_auc={} f1={:.4} precision@10%={:.4} recall@10%={:.4}",
        metrics.rf.roc_auc.map_or("null".to_string(), |v| format!("{:.4}", v)),
        metrics.rf.f1,
        metrics.rf.precision_at_10pct,
        metrics.rf.recall_at_10pct
    );

    let mut ranked: Vec<(&String, f64)> = metadata
        .feature_spec
        .iter()
        .zip(metadata.shap_importance.iter().copied())
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    println!("  top features:");
    for (name, weight) in ranked.iter().take(5) {
        println!("    {:<36} {:.4}", name, weight);
    }

    println!("  sample preview:");
    for (row, label) in sample.iter().take(PREVIEW_ROWS) {
        let probability = rf
            .as_ref()
            .map(|d| d.model.score_row(row.view()))
            .transpose()?;
        // Standardize then negate so that larger means more anomalous
        let anomaly = iforest
            .as_ref()
            .map(|d| d.model.score_row(row.view()))
            .transpose()?
            .map(|raw| -(raw - metadata.if_mean) / metadata.if_std);
        println!(
            "    label={} fraud_probability={} anomaly_z={}",
            label,
            probability.map_or("n/a".to_string(), |p| format!("{:.4}", p)),
            anomaly.map_or("n/a".to_string(), |z| format!("{:+.3}", z)),
        );
    }

    Ok(())
}
