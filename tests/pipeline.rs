use claim_fraud_trainer::config::AppConfig;
use claim_fraud_trainer::explain::ImportanceSource;
use claim_fraud_trainer::models::interchange::read_document;
use claim_fraud_trainer::models::{FeatureAttributor, TrainableScorer};
use claim_fraud_trainer::training::Capabilities;
use claim_fraud_trainer::{ModelError, ModelMetadata, TrainError, TrainingPipeline, FEATURE_SPEC};
use ndarray::{Array2, ArrayView2};
use std::fs;
use std::path::Path;

fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.simulation.count = 1000;
    config.simulation.fraud_rate = 0.15;
    config.simulation.seed = 42;
    config.classifier.n_estimators = 20;
    config.detector.n_estimators = 50;
    config.export.output_dir = dir.to_path_buf();
    config
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_reference_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let summary = TrainingPipeline::new(test_config(dir.path()))
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(summary.simulation.final_positives, 150);
    assert_eq!(summary.train_size, 800);
    assert_eq!(summary.test_size, 200);
    assert_eq!(summary.importance_source, ImportanceSource::Attribution);

    let metadata = ModelMetadata::load(&dir.path().join("metadata.json")).unwrap();
    assert_eq!(metadata.feature_spec, FEATURE_SPEC.to_vec());
    assert_eq!(metadata.feature_means.len(), 15);
    assert!(metadata.feature_stds.iter().all(|&s| s != 0.0));
    assert!((metadata.shap_importance.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    assert_eq!(metadata.rf_model_path.as_deref(), Some("rf.json"));
    assert_eq!(metadata.unsup_model_path.as_deref(), Some("iforest.json"));
    assert_eq!(metadata.unsupervised_type, "iforest");
    assert!(metadata.model_version.starts_with('v'));

    let metrics = read_json(&dir.path().join("metrics.json"));
    let matrix = &metrics["rf"]["confusion_matrix"];
    let total: u64 = (0..2)
        .flat_map(|i| (0..2).map(move |j| (i, j)))
        .map(|(i, j)| matrix[i][j].as_u64().unwrap())
        .sum();
    assert_eq!(total, 200);
    for key in ["roc_auc", "precision", "recall", "f1", "precision_at_10pct", "recall_at_10pct"] {
        assert!(metrics["rf"].get(key).is_some(), "missing {}", key);
    }

    let csv = fs::read_to_string(dir.path().join("sample_data.csv")).unwrap();
    assert_eq!(csv.lines().count(), 101);

    let rf = read_document(&dir.path().join("rf.json")).unwrap();
    assert_eq!(rf.feature_names, metadata.feature_spec);
}

#[test]
fn test_attribution_disabled_gives_uniform_importance() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.capabilities.attribution = false;

    let summary = TrainingPipeline::new(config).unwrap().run().unwrap();
    assert_eq!(summary.importance_source, ImportanceSource::UniformFallback);

    let metadata = read_json(&dir.path().join("metadata.json"));
    let weights = metadata["shap_importance"].as_array().unwrap();
    assert_eq!(weights.len(), 15);
    for weight in weights {
        assert!((weight.as_f64().unwrap() - 1.0 / 15.0).abs() < 1e-6);
    }
}

#[test]
fn test_serializer_disabled_records_null_paths() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.capabilities.interchange_export = false;

    TrainingPipeline::new(config).unwrap().run().unwrap();

    let metadata = read_json(&dir.path().join("metadata.json"));
    assert!(metadata["rf_model_path"].is_null());
    assert!(metadata["unsup_model_path"].is_null());
    assert!(!dir.path().join("rf.json").exists());
    assert!(!dir.path().join("iforest.json").exists());
}

#[test]
fn test_degraded_rerun_removes_previous_models() {
    let dir = tempfile::tempdir().unwrap();
    TrainingPipeline::new(test_config(dir.path())).unwrap().run().unwrap();
    assert!(dir.path().join("rf.json").exists());

    let mut config = test_config(dir.path());
    config.capabilities.interchange_export = false;
    TrainingPipeline::new(config).unwrap().run().unwrap();
    assert!(!dir.path().join("rf.json").exists());
}

/// Constant attributions in units small enough to break plain normalization
struct TinyAttributor;

impl FeatureAttributor for TinyAttributor {
    fn name(&self) -> &str {
        "tiny"
    }

    fn attribute(
        &self,
        _model: &dyn TrainableScorer,
        features: ArrayView2<'_, f32>,
    ) -> Result<Array2<f64>, ModelError> {
        Ok(Array2::from_elem(features.dim(), 1e-6))
    }
}

#[test]
fn test_small_scale_attributor_degrades_to_uniform() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.simulation.count = 300;
    let mut capabilities = Capabilities::from_config(&config);
    capabilities.attributor = Some(Box::new(TinyAttributor));

    let summary = TrainingPipeline::new(config)
        .unwrap()
        .run_with(capabilities)
        .unwrap();
    assert_eq!(summary.importance_source, ImportanceSource::UniformFallback);

    let metadata = ModelMetadata::load(&dir.path().join("metadata.json")).unwrap();
    assert!(metadata
        .shap_importance
        .iter()
        .all(|w| (w - 1.0 / 15.0).abs() < 1e-12));
}

#[test]
fn test_missing_classifier_aborts_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("bundle");
    let config = test_config(&out);
    let mut capabilities = Capabilities::from_config(&config);
    capabilities.classifier = None;

    let result = TrainingPipeline::new(config).unwrap().run_with(capabilities);
    assert!(matches!(result, Err(TrainError::MissingCapability(_))));
    assert!(!out.exists());
}

#[test]
fn test_runs_are_reproducible() {
    let first_dir = tempfile::tempdir().unwrap();
    let second_dir = tempfile::tempdir().unwrap();

    let first = TrainingPipeline::new(test_config(first_dir.path())).unwrap().run().unwrap();
    let second = TrainingPipeline::new(test_config(second_dir.path())).unwrap().run().unwrap();
    assert_eq!(first.metrics, second.metrics);

    let a = read_json(&first_dir.path().join("metadata.json"));
    let b = read_json(&second_dir.path().join("metadata.json"));
    for key in ["feature_means", "feature_stds", "shap_importance", "if_mean", "if_std"] {
        assert_eq!(a[key], b[key], "{} differs", key);
    }
    assert_eq!(
        fs::read(first_dir.path().join("sample_data.csv")).unwrap(),
        fs::read(second_dir.path().join("sample_data.csv")).unwrap()
    );
    assert_eq!(
        fs::read(first_dir.path().join("rf.json")).unwrap(),
        fs::read(second_dir.path().join("rf.json")).unwrap()
    );
}

#[test]
fn test_invalid_config_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.split.train_fraction = 1.0;
    assert!(matches!(
        TrainingPipeline::new(config),
        Err(TrainError::InvalidConfig(_))
    ));
}
