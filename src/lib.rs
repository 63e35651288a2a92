//! Claim Fraud Trainer Library
//!
//! Generates a reproducible synthetic insurance-claim dataset with injected
//! fraud patterns, trains a supervised forest and an isolation forest on it,
//! evaluates the classifier and exports a versioned artifact bundle for an
//! independent scoring service.

pub mod config;
pub mod error;
pub mod explain;
pub mod exporter;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod simulator;
pub mod split;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{ModelError, SimulationError, TrainError};
pub use feature_extractor::{FeatureExtractor, FEATURE_SPEC};
pub use pipeline::{RunSummary, TrainingPipeline};
pub use simulator::simulate;
pub use training::Capabilities;
pub use types::{ClaimRecord, Dataset, MetricsReport, ModelMetadata};
