//! End-to-end training run: simulate, split, train, evaluate, explain, export.

use crate::config::AppConfig;
use crate::error::Result;
use crate::explain::{ExplainabilityAggregator, ImportanceSource};
use crate::exporter::{ArtifactExporter, ExportInputs, ExportReport};
use crate::feature_extractor::FeatureExtractor;
use crate::metrics::{self, Evaluator};
use crate::simulator::{ClaimSimulator, SimulationSummary};
use crate::split::TrainTestSplit;
use crate::training::{Capabilities, TrainingOrchestrator};
use crate::types::MetricsReport;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use tracing::info;

/// Result of one completed run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub simulation: SimulationSummary,
    pub train_size: usize,
    pub test_size: usize,
    pub metrics: MetricsReport,
    pub importance_source: ImportanceSource,
    /// `None` when export is disabled
    pub export: Option<ExportReport>,
    pub elapsed: Duration,
}

/// One training run over a validated configuration
pub struct TrainingPipeline {
    config: AppConfig,
    extractor: FeatureExtractor,
}

impl TrainingPipeline {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            extractor: FeatureExtractor::new(),
        })
    }

    /// Run with the default capabilities selected by configuration
    pub fn run(&self) -> Result<RunSummary> {
        self.run_with(Capabilities::from_config(&self.config))
    }

    /// Run with injected capabilities. Mandatory ones are checked before any work.
    pub fn run_with(&self, capabilities: Capabilities) -> Result<RunSummary> {
        let start = Instant::now();
        let mut capabilities = capabilities.resolve()?;

        // Single run generator: simulation first, then the shuffle
        let mut rng = StdRng::seed_from_u64(self.config.simulation.seed);

        let simulator = ClaimSimulator::new(
            self.config.simulation.count,
            self.config.simulation.fraud_rate,
        )?;
        let (dataset, simulation) = simulator.generate(&mut rng)?;

        let split = TrainTestSplit::new(dataset.len(), self.config.split.train_fraction, &mut rng);
        info!(
            train = split.train_len(),
            test = split.test_len(),
            seed = self.config.simulation.seed,
            "Dataset split"
        );

        let outcome =
            TrainingOrchestrator::new(&self.extractor).train(&mut capabilities, &dataset, &split)?;

        let rf = Evaluator::new(&self.config.evaluation)
            .evaluate(&outcome.test_labels, &outcome.test_probabilities)?;
        metrics::print_summary(&rf);
        let report = MetricsReport { rf };

        let importance = ExplainabilityAggregator::new(capabilities.attributor.as_deref())
            .importance(capabilities.classifier.as_ref(), outcome.train_features.view());

        let export = if self.config.export.enabled {
            let (feature_means, feature_stds) = self.extractor.column_stats(&dataset);
            let exporter = ArtifactExporter::new(
                &self.config.export.output_dir,
                self.config.export.sample_rows,
                capabilities.serializer.as_deref(),
            );
            let exported = exporter.export(&ExportInputs {
                dataset: &dataset,
                classifier: capabilities.classifier.as_ref(),
                detector: capabilities.detector.as_ref(),
                feature_means,
                feature_stds,
                importance: &importance,
                detector_normalization: outcome.detector_normalization,
                metrics: &report,
            })?;
            info!(
                dir = %exported.output_dir.display(),
                version = %exported.metadata.model_version,
                "Artifact bundle written"
            );
            Some(exported)
        } else {
            info!("Export disabled, no artifacts written");
            None
        };

        let elapsed = start.elapsed();
        info!(
            records = dataset.len(),
            positives = simulation.final_positives,
            fraud_rate = dataset.fraud_rate(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Training run complete"
        );

        Ok(RunSummary {
            simulation,
            train_size: split.train_len(),
            test_size: split.test_len(),
            metrics: report,
            importance_source: importance.source,
            export,
            elapsed,
        })
    }
}
