//! Offline model trainer
//!
//! Fits the scaler and logistic regression on seeded synthetic data and
//! writes the JSON artifact the API server loads.

use clap::Parser;
use eyre::WrapErr;
use microloan::core::training::{train, TrainingConfig, DEFAULT_SAMPLES, DEFAULT_SEED};
use microloan::utils::init_logging;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Train the micro-loan scoring model")]
struct Args {
    /// RNG seed for the synthetic dataset
    #[arg(long, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Number of synthetic applicants
    #[arg(long, default_value_t = DEFAULT_SAMPLES)]
    samples: usize,

    /// Artifact output path
    #[arg(short, long, default_value = "artifacts/model.json")]
    output: PathBuf,
}

fn main() -> eyre::Result<()> {
    init_logging("info", false);
    let args = Args::parse();

    let config = TrainingConfig {
        seed: args.seed,
        samples: args.samples,
        ..TrainingConfig::default()
    };
    let (artifact, report) = train(&config).wrap_err("Training failed")?;
    artifact
        .save(&args.output)
        .wrap_err_with(|| format!("Failed to write {}", args.output.display()))?;

    info!(
        path = %args.output.display(),
        samples = report.samples,
        positives = report.positives,
        iterations = report.iterations,
        "Artifact saved"
    );
    println!("Training accuracy: {:.3}", report.accuracy);
    println!("Model saved to {}", args.output.display());
    Ok(())
}
