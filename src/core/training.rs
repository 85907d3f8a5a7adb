//! Synthetic training pipeline
//!
//! Generates a reproducible alternative-data dataset, labels applicants by
//! whether their synthetic creditworthiness beats the median, then fits the
//! scaler and logistic regression.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;

use super::model::{
    FitOptions, LogisticRegression, ModelArtifact, Row, StandardScaler, ARTIFACT_VERSION,
};
use crate::models::{AppError, AppResult, ErrorCode};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_SAMPLES: usize = 1000;
/// Scaled rows kept for the explainer
pub const BACKGROUND_SIZE: usize = 100;

/// Sampling range per feature, `FEATURE_NAMES` order
const FEATURE_RANGES: [(f64, f64); 4] = [(0.0, 20.0), (10.0, 200.0), (0.0, 1.0), (0.0, 10.0)];

#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub seed: u64,
    pub samples: usize,
    pub fit: FitOptions,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            samples: DEFAULT_SAMPLES,
            fit: FitOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub positives: usize,
    pub accuracy: f64,
    pub iterations: usize,
}

/// Generated features and labels
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    pub rows: Vec<Row>,
    pub labels: Vec<bool>,
}

/// Hand-weighted creditworthiness used only to label synthetic data
pub fn synthetic_score(row: &Row) -> f64 {
    0.3 * row[0] + 0.2 * row[1] + 0.4 * row[2] * 10.0 + 0.1 * row[3]
}

/// Median, averaging the two middle values for even lengths
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

pub fn generate_dataset(samples: usize, seed: u64) -> AppResult<SyntheticDataset> {
    if samples < 2 {
        return Err(AppError::new(
            ErrorCode::ModelTrainingFailed,
            format!("Need at least 2 samples, got {}", samples),
        ));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let rows: Vec<Row> = (0..samples)
        .map(|_| {
            let mut row = [0.0; 4];
            for (value, (low, high)) in row.iter_mut().zip(FEATURE_RANGES.iter()) {
                *value = rng.gen_range(*low..*high);
            }
            row
        })
        .collect();

    let scores: Vec<f64> = rows.iter().map(synthetic_score).collect();
    let threshold = median(&scores).unwrap_or_default();
    let labels = scores.iter().map(|s| *s > threshold).collect();

    Ok(SyntheticDataset { rows, labels })
}

/// Full pipeline: dataset, scaler, model, background sample
pub fn train(config: &TrainingConfig) -> AppResult<(ModelArtifact, TrainingReport)> {
    let dataset = generate_dataset(config.samples, config.seed)?;
    let positives = dataset.labels.iter().filter(|l| **l).count();
    if positives == 0 || positives == dataset.labels.len() {
        return Err(AppError::new(
            ErrorCode::ModelTrainingFailed,
            "Synthetic labels contain a single class",
        ));
    }

    let scaler = StandardScaler::fit(&dataset.rows)?;
    let scaled = scaler.transform_all(&dataset.rows);
    let (model, iterations) = LogisticRegression::fit(&scaled, &dataset.labels, &config.fit)?;
    let accuracy = model.accuracy(&scaled, &dataset.labels);

    let background = scaled.iter().take(BACKGROUND_SIZE).copied().collect();

    let report = TrainingReport {
        samples: dataset.rows.len(),
        positives,
        accuracy,
        iterations,
    };
    info!(
        samples = report.samples,
        positives = report.positives,
        accuracy = report.accuracy,
        iterations = report.iterations,
        "Model trained"
    );

    let artifact = ModelArtifact {
        version: ARTIFACT_VERSION,
        scaler,
        model,
        background,
    };
    Ok((artifact, report))
}
