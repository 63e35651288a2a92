//! Error types for the claim fraud trainer

use thiserror::Error;

/// Errors raised while generating the synthetic dataset
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("fraud rate must be within [0, 1], got {0}")]
    InvalidFraudRate(f64),

    #[error("distribution error: {0}")]
    Distribution(String),
}

/// Errors raised by trainable scorers and their capabilities
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0} has not been fitted")]
    NotFitted(String),

    #[error("{0} requires labels to fit")]
    MissingLabels(String),

    #[error("cannot fit {0} on an empty matrix")]
    EmptyInput(String),

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a training run
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("mandatory capability unavailable: {0}")]
    MissingCapability(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("artifact contract violated: {0}")]
    Contract(String),

    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrainError>;
