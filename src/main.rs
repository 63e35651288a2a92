//! Claim Fraud Trainer - Main Entry Point
//!
//! Simulates a labeled claim dataset, trains the supervised classifier and the
//! anomaly detector, evaluates them and writes the artifact bundle.

use anyhow::{Context, Result};
use clap::Parser;
use claim_fraud_trainer::{
    config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH},
    pipeline::TrainingPipeline,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Train claim fraud models on synthetic data and export the artifact bundle
#[derive(Debug, Parser)]
#[command(name = "claim-fraud-trainer", version, about)]
struct Cli {
    /// Configuration file (optional; missing file means defaults)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Number of claims to simulate
    #[arg(long = "n", alias = "count")]
    count: Option<usize>,

    /// Target share of fraudulent claims
    #[arg(long)]
    fraud_rate: Option<f64>,

    /// Directory receiving the artifact bundle
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Seed of the simulation and split generator
    #[arg(long)]
    seed: Option<u64>,

    /// Train and evaluate without writing artifacts
    #[arg(long)]
    no_export: bool,

    /// Skip feature attribution (uniform importance)
    #[arg(long)]
    no_attribution: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Cli {
    /// Apply command line values over file and environment configuration
    fn apply(&self, config: &mut AppConfig) {
        if let Some(count) = self.count {
            config.simulation.count = count;
        }
        if let Some(rate) = self.fraud_rate {
            config.simulation.fraud_rate = rate;
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if self.no_export {
            config.export.enabled = false;
        }
        if self.no_attribution {
            config.capabilities.attribution = false;
        }
        if self.debug {
            config.logging.level = "debug".to_string();
        }
    }
}

/// `RUST_LOG` when set, otherwise the configured level for this crate
fn log_filter(logging: &LoggingConfig, rust_log: Option<&str>) -> Result<EnvFilter> {
    match rust_log.filter(|directives| !directives.trim().is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).context("Invalid RUST_LOG"),
        None => Ok(EnvFilter::new(format!(
            "claim_fraud_trainer={}",
            logging.level
        ))),
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = log_filter(logging, rust_log.as_deref())?;

    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from_path(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    cli.apply(&mut config);

    init_logging(&config.logging)?;
    info!("Starting Claim Fraud Trainer");
    info!(
        count = config.simulation.count,
        fraud_rate = config.simulation.fraud_rate,
        seed = config.simulation.seed,
        output_dir = %config.export.output_dir.display(),
        "Configuration loaded"
    );

    let pipeline = TrainingPipeline::new(config).context("Invalid configuration")?;
    let summary = pipeline.run().context("Training run failed")?;

    let rf = &summary.metrics.rf;
    info!(
        roc_auc = ?rf.roc_auc,
        f1 = rf.f1,
        precision_at_k = rf.precision_at_10pct,
        recall_at_k = rf.recall_at_10pct,
        importance = ?summary.importance_source,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Done"
    );
    if let Some(export) = &summary.export {
        info!(
            rf_model = ?export.metadata.rf_model_path,
            unsup_model = ?export.metadata.unsup_model_path,
            dir = %export.output_dir.display(),
            "Bundle ready"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_log_takes_precedence() {
        let logging = LoggingConfig::default();
        let filter = log_filter(&logging, Some("claim_fraud_trainer=debug")).unwrap();
        assert_eq!(filter.to_string(), "claim_fraud_trainer=debug");
    }

    #[test]
    fn test_configured_level_without_rust_log() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(
            log_filter(&logging, None).unwrap().to_string(),
            "claim_fraud_trainer=warn"
        );
        assert_eq!(
            log_filter(&logging, Some("  ")).unwrap().to_string(),
            "claim_fraud_trainer=warn"
        );
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["claim-fraud-trainer", "--n", "300", "--no-export", "--debug"]);
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.simulation.count, 300);
        assert!(!config.export.enabled);
        assert_eq!(config.logging.level, "debug");
    }
}
