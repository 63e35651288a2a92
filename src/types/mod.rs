//! Type definitions for the claim fraud trainer

pub mod artifact;
pub mod claim;

pub use artifact::{ClassifierMetrics, MetricsReport, ModelMetadata};
pub use claim::{ClaimRecord, Dataset};
